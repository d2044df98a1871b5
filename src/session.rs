use std::sync::Arc;

use crate::kv::{KvError, KvStore};

/// Key under which the opaque backend session blob is persisted.
pub const SESSION_KEY: &str = "session-v1";

/// Sole owner of the persisted session bytes. Written only after the
/// controller reaches `Authorized`, deleted when the backend reports the
/// credential as permanently revoked.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Result<Option<String>, KvError> {
        let blob = self.kv.get(SESSION_KEY)?;
        Ok(blob.filter(|value| !value.trim().is_empty()))
    }

    pub fn save(&self, blob: &str) -> Result<(), KvError> {
        self.kv.set(SESSION_KEY, blob)
    }

    pub fn clear(&self) -> Result<(), KvError> {
        self.kv.delete(SESSION_KEY)
    }
}
