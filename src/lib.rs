//! Chat core for hosting Telegram conversations inside a launcher
//! surface: the authentication/session lifecycle controller and the
//! folder-aware chat synchronization cache that sit between a host UI and
//! the messaging backend's protocol client. The protocol client itself,
//! QR rendering and the presentation layer are supplied by the host.

pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod folders;
pub mod kv;
pub mod peer;
pub mod sanitize;
pub mod session;
pub mod sync;

pub use auth::{AuthController, AuthError, AuthOptions, AuthPhase, PasswordChallenge};
pub use backend::{
    AuthStatus, Backend, BackendError, ConnectRequest, Connection, LoginToken, RawDialog,
    RawEntity, RawFolder, RawMessage, RawPeer,
};
pub use chat::{Chat, Message};
pub use config::{Config, ConfigError};
pub use folders::{ALL_CHATS_FOLDER_ID, Folder, FolderCache};
pub use kv::{FileKvStore, KvError, KvStore, MemoryKv};
pub use peer::{ChatKind, EntityClass, PeerKind, PeerRef};
pub use session::SessionStore;
pub use sync::{ChatSyncEngine, DIALOG_FETCH_LIMIT, SyncError};
