use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::backend::{BackendError, Connection, RawPeer};
use crate::chat::Chat;
use crate::kv::{KvError, KvStore};
use crate::peer::PeerRef;
use crate::sanitize::sanitize_text;

pub const SELECTED_FOLDER_KEY: &str = "selected-folder-id";
pub const INCLUDE_PEERS_KEY: &str = "folder-include-peers";
pub const PINNED_PEERS_KEY: &str = "folder-pinned-peers";

/// Folder id denoting "no filter": the full chat list.
pub const ALL_CHATS_FOLDER_ID: i32 = 0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i32,
    pub title: String,
    pub emoticon: String,
    pub include_peer_ids: Vec<String>,
    pub pinned_peer_ids: Vec<String>,
}

/// Persists per-folder membership sets and filters chat lists against them.
/// The backend's native folder-scoped listing silently returns unfiltered
/// results in some cases, so this cache is the primary mechanism, not a
/// fallback.
#[derive(Clone)]
pub struct FolderCache {
    kv: Arc<dyn KvStore>,
}

impl FolderCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Fetches the folder list fresh from the backend, prepending the
    /// synthetic "All Chats" entry.
    pub async fn refresh<C: Connection>(&self, conn: &C) -> Result<Vec<Folder>, BackendError> {
        let raw = conn.folders().await?;
        let mut folders = Vec::with_capacity(raw.len() + 1);
        folders.push(Folder {
            id: ALL_CHATS_FOLDER_ID,
            title: "All Chats".to_string(),
            emoticon: String::new(),
            include_peer_ids: Vec::new(),
            pinned_peer_ids: Vec::new(),
        });
        for folder in raw {
            folders.push(Folder {
                id: folder.id,
                title: sanitize_text(&folder.title),
                emoticon: sanitize_text(&folder.emoticon),
                include_peer_ids: peer_ids(&folder.include_peers),
                pinned_peer_ids: peer_ids(&folder.pinned_peers),
            });
        }
        Ok(folders)
    }

    /// The remembered folder selection, defaulting to "All Chats".
    pub fn selected_folder(&self) -> Result<i32, KvError> {
        let stored = self.kv.get(SELECTED_FOLDER_KEY)?;
        Ok(stored
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(ALL_CHATS_FOLDER_ID))
    }

    /// Persists `folder_id` as the new default along with its membership
    /// peers, deduplicated by chat id. Any set cached for a different folder
    /// is overwritten; selecting folder 0 clears the cache entirely.
    pub fn select(
        &self,
        folder_id: i32,
        include_peers: &[RawPeer],
        pinned_peers: &[RawPeer],
    ) -> Result<(), KvError> {
        if folder_id == ALL_CHATS_FOLDER_ID {
            self.kv.delete(INCLUDE_PEERS_KEY)?;
            self.kv.delete(PINNED_PEERS_KEY)?;
            self.kv.set(SELECTED_FOLDER_KEY, "0")?;
            return Ok(());
        }

        let include = dedup_refs(include_peers, &HashSet::new());
        let include_ids: HashSet<String> = include.iter().map(|peer| peer.id.clone()).collect();
        let pinned = dedup_refs(pinned_peers, &include_ids);

        self.kv
            .set(INCLUDE_PEERS_KEY, &serde_json::to_string(&include)?)?;
        self.kv
            .set(PINNED_PEERS_KEY, &serde_json::to_string(&pinned)?)?;
        self.kv.set(SELECTED_FOLDER_KEY, &folder_id.to_string())?;
        debug!(
            folder_id,
            members = include.len() + pinned.len(),
            "cached folder membership"
        );
        Ok(())
    }

    /// The cached membership set for `folder_id`, or `None` when the cache
    /// belongs to a different folder or was never populated.
    pub fn cached_set(&self, folder_id: i32) -> Result<Option<HashSet<String>>, KvError> {
        if folder_id == ALL_CHATS_FOLDER_ID || self.selected_folder()? != folder_id {
            return Ok(None);
        }
        let include = self.read_refs(INCLUDE_PEERS_KEY)?;
        let pinned = self.read_refs(PINNED_PEERS_KEY)?;
        let (Some(include), Some(pinned)) = (include, pinned) else {
            return Ok(None);
        };
        Ok(Some(
            include
                .into_iter()
                .chain(pinned)
                .map(|peer| peer.id)
                .collect(),
        ))
    }

    /// Filters `chats` by the cached set for `folder_id`. Identity for
    /// folder 0 and, preferring partial results over failure, for folders
    /// with no cached set.
    pub fn apply(&self, folder_id: i32, chats: Vec<Chat>) -> Result<Vec<Chat>, KvError> {
        let Some(members) = self.cached_set(folder_id)? else {
            return Ok(chats);
        };
        Ok(chats
            .into_iter()
            .filter(|chat| members.contains(&chat.id))
            .collect())
    }

    fn read_refs(&self, key: &str) -> Result<Option<Vec<PeerRef>>, KvError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

fn peer_ids(peers: &[RawPeer]) -> Vec<String> {
    let mut seen = HashSet::new();
    peers
        .iter()
        .map(|peer| PeerRef::new(peer.id, peer.class).id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn dedup_refs(peers: &[RawPeer], exclude: &HashSet<String>) -> Vec<PeerRef> {
    let mut seen = HashSet::new();
    peers
        .iter()
        .map(|peer| PeerRef::new(peer.id, peer.class))
        .filter(|peer| !exclude.contains(&peer.id) && seen.insert(peer.id.clone()))
        .collect()
}
