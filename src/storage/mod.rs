//! Durable artifact storage
//!
//! Key → blob store addressed by [`CacheKey::object_path`]. Writes are whole
//! object replacements, so concurrent writers for the same key can only race
//! to last-writer-wins, never to a torn object. Reads take no locks.

mod fs;
mod gcs;
mod memory;

pub use fs::FsStorage;
pub use gcs::GcsStorage;
pub use memory::MemoryStorage;

use crate::artifact::{Artifact, CacheKey};
use crate::config::schema::StorageConfig;
use crate::config::ConfigManager;
use crate::error::{BinsmithError, BinsmithResult, StorageError};
use async_trait::async_trait;
use std::sync::Arc;

/// Artifact store backend
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the artifact for `key`, `None` if it was never stored
    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, StorageError>;

    /// Store `artifact`, replacing any existing object for its key
    async fn put(&self, artifact: &Artifact) -> Result<(), StorageError>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Object name for `key` under an optional prefix
pub fn object_name(prefix: &str, key: &CacheKey) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key.object_path()
    } else {
        format!("{}/{}", prefix, key.object_path())
    }
}

/// Create the storage backend named in configuration
pub fn create_storage(config: &StorageConfig) -> BinsmithResult<Arc<dyn Storage>> {
    match config.backend.as_str() {
        "fs" => {
            let root = config
                .root
                .clone()
                .unwrap_or_else(ConfigManager::artifacts_dir);
            Ok(Arc::new(FsStorage::new(root, &config.prefix)))
        }
        "gcs" => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| BinsmithError::StorageSettingMissing {
                    backend: "gcs".to_string(),
                    field: "bucket",
                })?;
            Ok(Arc::new(GcsStorage::new(config, bucket)))
        }
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        other => Err(BinsmithError::UnknownStorageBackend(other.to_string())),
    }
}
