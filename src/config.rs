use std::env;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEPANE_API_ID is not set")]
    MissingApiId,
    #[error("TELEPANE_API_ID is not a valid integer")]
    InvalidApiId,
    #[error("TELEPANE_API_HASH is not set")]
    MissingApiHash,
}

/// Application credentials and storage locations. The api hash is a secret
/// and is redacted from debug output.
#[derive(Clone)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub data_dir: PathBuf,
    pub store_path: PathBuf,
}

impl Config {
    /// Builds a config from compiled-in credentials, for hosts that ship
    /// them rather than reading the environment.
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        let debug = cfg!(debug_assertions);
        let data_dir = default_data_dir(debug);
        let store_path = data_dir.join("store.json");
        Self {
            api_id,
            api_hash: api_hash.into(),
            data_dir,
            store_path,
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let debug = cfg!(debug_assertions);
        let api_id = env::var("TELEPANE_API_ID")
            .map_err(|_| ConfigError::MissingApiId)?
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;
        let api_hash = env::var("TELEPANE_API_HASH").map_err(|_| ConfigError::MissingApiHash)?;

        let data_dir = env::var("TELEPANE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir(debug));
        let store_path = env::var("TELEPANE_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("store.json"));

        Ok(Self {
            api_id,
            api_hash,
            data_dir,
            store_path,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("data_dir", &self.data_dir)
            .field("store_path", &self.store_path)
            .finish()
    }
}

fn default_data_dir(debug: bool) -> PathBuf {
    let base = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let dir_name = if debug { "telepane-dev" } else { "telepane" };
    base.join(".local").join("share").join(dir_name)
}
