//! Scripted in-memory backend used by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use telepane::{
    AuthStatus, Backend, BackendError, ConnectRequest, Connection, EntityClass, LoginToken,
    RawDialog, RawEntity, RawFolder, RawMessage, RawPeer,
};

pub struct MockBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
pub struct Inner {
    /// Fail this many connect attempts with a transport error before
    /// letting one through.
    pub connect_failures: AtomicUsize,
    pub connect_count: AtomicUsize,
    /// Session blob observed on each connect attempt.
    pub sessions_seen: Mutex<Vec<Option<String>>>,
    /// Overrides the status script once set (e.g. by a correct password).
    pub authorized: AtomicBool,
    /// Poll-by-poll authorization statuses; `Pending` once exhausted.
    pub statuses: Mutex<VecDeque<Result<AuthStatus, BackendError>>>,
    pub expected_password: Mutex<Option<String>>,
    pub tokens_issued: AtomicUsize,
    pub dialogs: Mutex<Vec<RawDialog>>,
    pub folders: Mutex<Vec<RawFolder>>,
    pub history: Mutex<Vec<RawMessage>>,
    pub sent: Mutex<Vec<(String, String, i64)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    pub fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }

    /// A connection handle without going through the controller, for sync
    /// tests that assume an already-authorized session.
    pub fn conn(&self) -> MockConn {
        MockConn(self.inner.clone())
    }

    pub fn set_authorized(&self, value: bool) {
        self.inner.authorized.store(value, Ordering::SeqCst);
    }

    pub fn script_statuses(
        &self,
        statuses: impl IntoIterator<Item = Result<AuthStatus, BackendError>>,
    ) {
        let mut queue = self.inner.statuses.lock().expect("statuses lock");
        queue.extend(statuses);
    }

    pub fn set_password(&self, secret: &str) {
        *self.inner.expected_password.lock().expect("password lock") = Some(secret.to_string());
    }

    pub fn set_dialogs(&self, dialogs: Vec<RawDialog>) {
        *self.inner.dialogs.lock().expect("dialogs lock") = dialogs;
    }

    pub fn set_folders(&self, folders: Vec<RawFolder>) {
        *self.inner.folders.lock().expect("folders lock") = folders;
    }

    pub fn set_history(&self, history: Vec<RawMessage>) {
        *self.inner.history.lock().expect("history lock") = history;
    }
}

impl Backend for MockBackend {
    type Conn = MockConn;

    async fn connect(&self, request: ConnectRequest<'_>) -> Result<MockConn, BackendError> {
        let attempt = self.inner.connect_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .sessions_seen
            .lock()
            .expect("sessions lock")
            .push(request.session.map(str::to_string));
        if attempt <= self.inner.connect_failures.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(MockConn(self.inner.clone()))
    }
}

pub struct MockConn(Arc<Inner>);

impl Connection for MockConn {
    async fn auth_status(&self) -> Result<AuthStatus, BackendError> {
        if self.0.authorized.load(Ordering::SeqCst) {
            return Ok(AuthStatus::Authorized);
        }
        let scripted = self.0.statuses.lock().expect("statuses lock").pop_front();
        match scripted {
            Some(status) => {
                if matches!(status, Ok(AuthStatus::Authorized)) {
                    self.0.authorized.store(true, Ordering::SeqCst);
                }
                status
            }
            None => Ok(AuthStatus::Pending),
        }
    }

    async fn request_login_token(&self) -> Result<LoginToken, BackendError> {
        let serial = self.0.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(LoginToken {
            token: vec![serial as u8; 4],
            expires_at: i64::MAX,
        })
    }

    async fn check_password(&self, password: &str) -> Result<(), BackendError> {
        let expected = self
            .0
            .expected_password
            .lock()
            .expect("password lock")
            .clone();
        match expected {
            Some(expected) if expected == password => {
                self.0.authorized.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(BackendError::Rpc("PASSWORD_HASH_INVALID".to_string())),
        }
    }

    async fn export_session(&self) -> Result<String, BackendError> {
        Ok("fresh-session-blob".to_string())
    }

    async fn dialogs(&self, limit: usize) -> Result<Vec<RawDialog>, BackendError> {
        let dialogs = self.0.dialogs.lock().expect("dialogs lock").clone();
        Ok(dialogs.into_iter().take(limit).collect())
    }

    async fn folders(&self) -> Result<Vec<RawFolder>, BackendError> {
        Ok(self.0.folders.lock().expect("folders lock").clone())
    }

    async fn history(&self, _chat_id: &str, limit: usize) -> Result<Vec<RawMessage>, BackendError> {
        let history = self.0.history.lock().expect("history lock").clone();
        Ok(history.into_iter().take(limit).collect())
    }

    async fn send_text(&self, chat_id: &str, text: &str, random_id: i64) -> Result<(), BackendError> {
        self.0
            .sent
            .lock()
            .expect("sent lock")
            .push((chat_id.to_string(), text.to_string(), random_id));
        Ok(())
    }
}

pub fn user_entity(id: i64, title: &str) -> RawEntity {
    RawEntity {
        id,
        class: EntityClass::User,
        megagroup: false,
        title: title.to_string(),
        username: None,
        about: String::new(),
    }
}

pub fn channel_entity(id: i64, title: &str) -> RawEntity {
    RawEntity {
        id,
        class: EntityClass::Channel,
        megagroup: false,
        title: title.to_string(),
        username: None,
        about: String::new(),
    }
}

pub fn dialog(entity: RawEntity) -> RawDialog {
    RawDialog {
        entity: Some(entity),
        unread_count: 0,
        last_message: Some("last message".to_string()),
    }
}

pub fn folder(id: i32, title: &str, include: Vec<RawPeer>, pinned: Vec<RawPeer>) -> RawFolder {
    RawFolder {
        id,
        title: title.to_string(),
        emoticon: String::new(),
        include_peers: include,
        pinned_peers: pinned,
    }
}

pub fn user_peer(id: i64) -> RawPeer {
    RawPeer {
        id,
        class: EntityClass::User,
    }
}

pub fn channel_peer(id: i64) -> RawPeer {
    RawPeer {
        id,
        class: EntityClass::Channel,
    }
}
