use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{BackendError, Connection};
use crate::chat::{self, Chat, Message};
use crate::folders::{ALL_CHATS_FOLDER_ID, Folder, FolderCache};
use crate::kv::KvError;
use crate::sanitize::sanitize_text;

/// Upper bound on the dialog snapshot fetched per listing.
pub const DIALOG_FETCH_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("store error: {0}")]
    Store(#[from] KvError),
    #[error("unknown folder id {0}")]
    UnknownFolder(i32),
    #[error("message is empty after sanitization")]
    EmptyMessage,
}

/// Orchestrates dialog fetches, formatting and folder filtering, and
/// passes individual message reads/sends straight through to the backend.
#[derive(Clone)]
pub struct ChatSyncEngine {
    folders: FolderCache,
}

impl ChatSyncEngine {
    pub fn new(folders: FolderCache) -> Self {
        Self { folders }
    }

    pub fn folder_cache(&self) -> &FolderCache {
        &self.folders
    }

    /// Fetches a capped dialog snapshot, formats it, and filters it by the
    /// folder's cached membership set. A cache miss repopulates the set
    /// from a fresh backend folder fetch; the backend's native
    /// folder-scoped listing is never used because it silently returns
    /// unfiltered results in some cases. Malformed dialogs are dropped,
    /// never fatal.
    pub async fn list_chats<C: Connection>(
        &self,
        conn: &C,
        folder_id: i32,
    ) -> Result<Vec<Chat>, SyncError> {
        let dialogs = conn.dialogs(DIALOG_FETCH_LIMIT).await?;
        let total = dialogs.len();
        let chats: Vec<Chat> = dialogs.iter().filter_map(chat::format_dialog).collect();
        if chats.len() < total {
            debug!(dropped = total - chats.len(), "dropped malformed dialogs");
        }

        if folder_id == ALL_CHATS_FOLDER_ID {
            return Ok(chats);
        }

        if self.folders.cached_set(folder_id)?.is_none() {
            match self.fetch_folder(conn, folder_id).await? {
                Some(folder) => {
                    self.folders
                        .select(folder_id, &folder.include_peers, &folder.pinned_peers)?;
                }
                None => {
                    warn!(folder_id, "unknown folder; returning the unfiltered list");
                    return Ok(chats);
                }
            }
        }

        Ok(self.folders.apply(folder_id, chats)?)
    }

    /// Refreshes folder definitions from the backend, "All Chats" first.
    pub async fn list_folders<C: Connection>(&self, conn: &C) -> Result<Vec<Folder>, SyncError> {
        Ok(self.folders.refresh(conn).await?)
    }

    /// Persists `folder_id` as the default selection, with a membership
    /// set fetched fresh from the backend.
    pub async fn select_folder<C: Connection>(
        &self,
        conn: &C,
        folder_id: i32,
    ) -> Result<(), SyncError> {
        if folder_id == ALL_CHATS_FOLDER_ID {
            self.folders.select(folder_id, &[], &[])?;
            return Ok(());
        }
        let folder = self
            .fetch_folder(conn, folder_id)
            .await?
            .ok_or(SyncError::UnknownFolder(folder_id))?;
        self.folders
            .select(folder_id, &folder.include_peers, &folder.pinned_peers)?;
        Ok(())
    }

    /// Direct passthrough fetch. Ordering is whatever the backend returns.
    pub async fn list_messages<C: Connection>(
        &self,
        conn: &C,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, SyncError> {
        let raw = conn.history(chat_id, limit).await?;
        Ok(raw.iter().map(chat::format_message).collect())
    }

    /// Sanitizes and sends. No local echo: callers re-fetch to observe the
    /// sent message, keeping the backend the single source of truth.
    pub async fn send_message<C: Connection>(
        &self,
        conn: &C,
        chat_id: &str,
        text: &str,
    ) -> Result<(), SyncError> {
        let text = sanitize_text(text);
        if text.is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let random_id = OsRng.next_u64() as i64;
        conn.send_text(chat_id, &text, random_id).await?;
        Ok(())
    }

    async fn fetch_folder<C: Connection>(
        &self,
        conn: &C,
        folder_id: i32,
    ) -> Result<Option<crate::backend::RawFolder>, SyncError> {
        let folders = conn.folders().await?;
        Ok(folders.into_iter().find(|folder| folder.id == folder_id))
    }
}
