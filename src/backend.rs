//! Boundary to the messaging backend's protocol client. The crate never
//! speaks the wire protocol itself; a host supplies an implementation of
//! these traits (typically wrapping the official client library) and the
//! controller and sync engine drive it.

use std::future::Future;

use thiserror::Error;

use crate::peer::EntityClass;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection-level failure. Retried by the controller's bounded
    /// connect loop, fatal everywhere else.
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend-reported request failure, carrying the backend's own error
    /// code string. Classified by message content at the auth boundary.
    #[error("{0}")]
    Rpc(String),
}

impl BackendError {
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }
}

/// Authorization state as polled during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Authorized,
    Pending,
    PasswordNeeded,
}

/// A login token issued for QR display. `expires_at` is unix seconds; the
/// controller re-issues once it passes.
#[derive(Debug, Clone)]
pub struct LoginToken {
    pub token: Vec<u8>,
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct RawEntity {
    pub id: i64,
    pub class: EntityClass,
    pub megagroup: bool,
    pub title: String,
    pub username: Option<String>,
    pub about: String,
}

/// Backend dialog record: a conversation entity plus summary metadata.
/// The entity can be missing when the backend returns a dangling peer.
#[derive(Debug, Clone)]
pub struct RawDialog {
    pub entity: Option<RawEntity>,
    pub unread_count: u32,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RawPeer {
    pub id: i64,
    pub class: EntityClass,
}

#[derive(Debug, Clone)]
pub struct RawFolder {
    pub id: i32,
    pub title: String,
    pub emoticon: String,
    pub include_peers: Vec<RawPeer>,
    pub pinned_peers: Vec<RawPeer>,
}

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub date: i64,
    pub text: String,
    pub outbound: bool,
    pub sender_first_name: Option<String>,
}

/// Credentials and optional saved session handed to the client at connect
/// time. Never logged in cleartext.
#[derive(Clone, Copy)]
pub struct ConnectRequest<'a> {
    pub api_id: i32,
    pub api_hash: &'a str,
    pub session: Option<&'a str>,
}

pub trait Backend: Send + Sync {
    type Conn: Connection;

    fn connect(
        &self,
        request: ConnectRequest<'_>,
    ) -> impl Future<Output = Result<Self::Conn, BackendError>> + Send;
}

pub trait Connection: Send + Sync {
    fn auth_status(&self) -> impl Future<Output = Result<AuthStatus, BackendError>> + Send;

    fn request_login_token(&self)
    -> impl Future<Output = Result<LoginToken, BackendError>> + Send;

    fn check_password(
        &self,
        password: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Serializes the authorized session into an opaque blob for reuse.
    fn export_session(&self) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn dialogs(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawDialog>, BackendError>> + Send;

    fn folders(&self) -> impl Future<Output = Result<Vec<RawFolder>, BackendError>> + Send;

    fn history(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawMessage>, BackendError>> + Send;

    fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        random_id: i64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
