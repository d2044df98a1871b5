//! Authentication/session lifecycle controller. Owns the connect retry
//! loop, the QR login handshake with its periodic authorization poll, the
//! single-use password challenge, and session persistence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{info, warn};

use crate::backend::{AuthStatus, Backend, BackendError, ConnectRequest, Connection, LoginToken};
use crate::config::Config;
use crate::kv::{KvError, lock};
use crate::peer;
use crate::sanitize::{MAX_ERROR_CHARS, sanitize};
use crate::session::SessionStore;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Transport failure that survived the bounded retry loop.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authorization timed out; scan the code and try again")]
    Timeout,
    #[error("credential revoked; sign in again")]
    CredentialRevoked,
    #[error("authorization canceled")]
    Canceled,
    #[error("another authorization attempt is already in progress")]
    InProgress,
    /// Backend-reported failure, surfaced verbatim (truncated for display).
    #[error("{0}")]
    Backend(String),
    #[error("store error: {0}")]
    Store(#[from] KvError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Disconnected,
    Connecting,
    AwaitingQrScan,
    AwaitingPassword,
    Authorized,
    Failed,
}

/// Handshake timings. Defaults follow the backend's expectations: three
/// connect attempts two seconds apart, a one-second authorization poll and
/// a three-minute scan window.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub poll_interval: Duration,
    pub qr_timeout: Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            qr_timeout: Duration::from_secs(180),
        }
    }
}

/// A pending 2FA password request. Resolvable exactly once; duplicate
/// resolutions and resolutions after abandonment are no-ops, so repeated
/// user input is harmless.
pub struct PasswordChallenge {
    slot: Mutex<Slot>,
}

enum Slot {
    Pending(oneshot::Sender<String>),
    Settled,
}

impl PasswordChallenge {
    fn new() -> (Arc<Self>, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                slot: Mutex::new(Slot::Pending(tx)),
            }),
            rx,
        )
    }

    /// Delivers the secret to the suspended handshake. Returns `false`
    /// without delivering when the secret is blank or the challenge was
    /// already settled.
    pub fn resolve(&self, secret: &str) -> bool {
        let secret = secret.trim();
        if secret.is_empty() {
            return false;
        }
        let mut slot = lock(&self.slot);
        match std::mem::replace(&mut *slot, Slot::Settled) {
            Slot::Pending(tx) => tx.send(secret.to_string()).is_ok(),
            Slot::Settled => false,
        }
    }

    /// Settles the challenge without delivering a secret.
    pub fn abandon(&self) {
        *lock(&self.slot) = Slot::Settled;
    }

    pub fn is_pending(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Pending(_))
    }
}

// Backend error-code strings that change control flow rather than surface
// to the user.
const TOKEN_EXPIRED_MARKER: &str = "AUTH_TOKEN_EXPIRED";
const REVOKED_MARKERS: [&str; 5] = [
    "AUTH_KEY_UNREGISTERED",
    "AUTH_KEY_INVALID",
    "SESSION_REVOKED",
    "SESSION_EXPIRED",
    "USER_DEACTIVATED",
];

enum RpcKind {
    TokenExpired,
    Revoked,
    Other,
}

fn classify_rpc(message: &str) -> RpcKind {
    if message.contains(TOKEN_EXPIRED_MARKER) {
        RpcKind::TokenExpired
    } else if REVOKED_MARKERS.iter().any(|marker| message.contains(marker)) {
        RpcKind::Revoked
    } else {
        RpcKind::Other
    }
}

enum HandshakeError {
    /// The login token expired backend-side; the whole connect/authorize
    /// cycle restarts from scratch.
    TokenExpired,
    Fatal(AuthError),
}

pub struct AuthController<B: Backend> {
    backend: B,
    config: Config,
    sessions: SessionStore,
    options: AuthOptions,
    phase_tx: watch::Sender<AuthPhase>,
    qr_tx: watch::Sender<Option<String>>,
    challenge: Mutex<Option<Arc<PasswordChallenge>>>,
    gate: tokio::sync::Mutex<()>,
}

impl<B: Backend> AuthController<B> {
    pub fn new(backend: B, config: Config, sessions: SessionStore) -> Self {
        Self::with_options(backend, config, sessions, AuthOptions::default())
    }

    pub fn with_options(
        backend: B,
        config: Config,
        sessions: SessionStore,
        options: AuthOptions,
    ) -> Self {
        let (phase_tx, _) = watch::channel(AuthPhase::Disconnected);
        let (qr_tx, _) = watch::channel(None);
        Self {
            backend,
            config,
            sessions,
            options,
            phase_tx,
            qr_tx,
            challenge: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Current handshake phase, updated as the state machine advances.
    pub fn subscribe_phase(&self) -> watch::Receiver<AuthPhase> {
        self.phase_tx.subscribe()
    }

    /// The login URI to render as a QR code, refreshed on every re-issue
    /// and cleared once the attempt ends.
    pub fn subscribe_qr(&self) -> watch::Receiver<Option<String>> {
        self.qr_tx.subscribe()
    }

    pub fn pending_challenge(&self) -> Option<Arc<PasswordChallenge>> {
        lock(&self.challenge).clone()
    }

    /// Resolves the pending password challenge, if any. Returns whether
    /// the secret was delivered; blank secrets and duplicate resolutions
    /// are rejected without effect.
    pub fn resolve_password(&self, secret: &str) -> bool {
        match self.pending_challenge() {
            Some(challenge) => challenge.resolve(secret),
            None => false,
        }
    }

    /// Drives the backend to `Authorized`, reusing a saved session when
    /// one exists and running the QR handshake otherwise. At most one
    /// attempt runs at a time; a concurrent call gets `InProgress`.
    /// Dropping the returned future cancels the attempt and releases the
    /// challenge and QR state.
    pub async fn authorize(&self) -> Result<B::Conn, AuthError> {
        let Ok(_gate) = self.gate.try_lock() else {
            return Err(AuthError::InProgress);
        };

        let mut reset = ResetGuard {
            controller: self,
            final_phase: AuthPhase::Disconnected,
        };
        let result = self.run().await;
        reset.final_phase = match &result {
            Ok(_) => AuthPhase::Authorized,
            Err(_) => AuthPhase::Failed,
        };
        drop(reset);
        result
    }

    async fn run(&self) -> Result<B::Conn, AuthError> {
        loop {
            self.set_phase(AuthPhase::Connecting);
            let session = self.sessions.load()?;
            let conn = self.connect_with_retry(session.as_deref()).await?;
            match self.ensure_authorized(&conn).await {
                Ok(()) => {
                    let blob = conn
                        .export_session()
                        .await
                        .map_err(|error| self.surface(error))?;
                    self.sessions.save(&blob)?;
                    info!("authorized; session persisted");
                    return Ok(conn);
                }
                Err(HandshakeError::TokenExpired) => {
                    warn!("login token expired; clearing session and restarting");
                    self.sessions.clear()?;
                    self.qr_tx.send_replace(None);
                }
                Err(HandshakeError::Fatal(error)) => return Err(error),
            }
        }
    }

    async fn connect_with_retry(&self, session: Option<&str>) -> Result<B::Conn, AuthError> {
        let attempts = self.options.connect_attempts.max(1);
        let request = ConnectRequest {
            api_id: self.config.api_id,
            api_hash: &self.config.api_hash,
            session,
        };
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.backend.connect(request).await {
                Ok(conn) => return Ok(conn),
                Err(BackendError::Transport(message)) => {
                    warn!(attempt, attempts, "connect failed: {message}");
                    last = message;
                    if attempt < attempts {
                        sleep(self.options.connect_retry_delay).await;
                    }
                }
                Err(BackendError::Rpc(message)) => return Err(self.surface_rpc(message)),
            }
        }
        Err(AuthError::Transport(last))
    }

    async fn ensure_authorized(&self, conn: &B::Conn) -> Result<(), HandshakeError> {
        match conn.auth_status().await {
            Ok(AuthStatus::Authorized) => {
                info!("saved session is still authorized");
                return Ok(());
            }
            Ok(_) => {}
            Err(error) => return Err(self.handshake_error(error)),
        }

        self.set_phase(AuthPhase::AwaitingQrScan);
        match timeout(self.options.qr_timeout, self.qr_handshake(conn)).await {
            Ok(result) => result,
            Err(_) => Err(HandshakeError::Fatal(AuthError::Timeout)),
        }
    }

    async fn qr_handshake(&self, conn: &B::Conn) -> Result<(), HandshakeError> {
        let mut token = self.issue_token(conn).await?;
        let mut poll = interval(self.options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            poll.tick().await;
            if epoch_seconds() >= token.expires_at {
                token = self.issue_token(conn).await?;
            }
            match conn.auth_status().await {
                Ok(AuthStatus::Authorized) => return Ok(()),
                Ok(AuthStatus::Pending) => {}
                Ok(AuthStatus::PasswordNeeded) => {
                    self.set_phase(AuthPhase::AwaitingPassword);
                    let secret = self.await_password().await?;
                    match conn.check_password(&secret).await {
                        Ok(()) => info!("password accepted"),
                        Err(error) => return Err(self.handshake_error(error)),
                    }
                }
                Err(error) => return Err(self.handshake_error(error)),
            }
        }
    }

    async fn issue_token(&self, conn: &B::Conn) -> Result<LoginToken, HandshakeError> {
        match conn.request_login_token().await {
            Ok(token) => {
                self.qr_tx.send_replace(Some(peer::login_uri(&token.token)));
                info!(expires_at = token.expires_at, "issued login token");
                Ok(token)
            }
            Err(error) => Err(self.handshake_error(error)),
        }
    }

    /// Suspends until the UI resolves the challenge. Exactly one
    /// completion wins; abandonment surfaces as cancellation.
    async fn await_password(&self) -> Result<String, HandshakeError> {
        let (challenge, rx) = PasswordChallenge::new();
        *lock(&self.challenge) = Some(challenge);
        let outcome = rx.await;
        *lock(&self.challenge) = None;
        outcome.map_err(|_| HandshakeError::Fatal(AuthError::Canceled))
    }

    fn handshake_error(&self, error: BackendError) -> HandshakeError {
        match error {
            BackendError::Transport(message) => {
                HandshakeError::Fatal(AuthError::Transport(message))
            }
            BackendError::Rpc(message) => match classify_rpc(&message) {
                RpcKind::TokenExpired => HandshakeError::TokenExpired,
                RpcKind::Revoked => {
                    self.clear_session_quietly();
                    HandshakeError::Fatal(AuthError::CredentialRevoked)
                }
                RpcKind::Other => {
                    HandshakeError::Fatal(AuthError::Backend(sanitize(&message, MAX_ERROR_CHARS)))
                }
            },
        }
    }

    fn surface(&self, error: BackendError) -> AuthError {
        match error {
            BackendError::Transport(message) => AuthError::Transport(message),
            BackendError::Rpc(message) => self.surface_rpc(message),
        }
    }

    fn surface_rpc(&self, message: String) -> AuthError {
        match classify_rpc(&message) {
            RpcKind::Revoked => {
                self.clear_session_quietly();
                AuthError::CredentialRevoked
            }
            _ => AuthError::Backend(sanitize(&message, MAX_ERROR_CHARS)),
        }
    }

    fn clear_session_quietly(&self) {
        if let Err(error) = self.sessions.clear() {
            warn!("failed to clear revoked session: {error}");
        }
    }

    fn set_phase(&self, phase: AuthPhase) {
        info!(?phase, "auth phase changed");
        self.phase_tx.send_replace(phase);
    }
}

/// Runs on every exit from `authorize`, including cancellation: abandons
/// any pending challenge, clears the published QR payload and records the
/// final phase so a fresh attempt starts cleanly.
struct ResetGuard<'a, B: Backend> {
    controller: &'a AuthController<B>,
    final_phase: AuthPhase,
}

impl<B: Backend> Drop for ResetGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(challenge) = lock(&self.controller.challenge).take() {
            challenge.abandon();
        }
        self.controller.qr_tx.send_replace(None);
        self.controller.phase_tx.send_replace(self.final_phase);
    }
}

fn epoch_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
