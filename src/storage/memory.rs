//! In-process artifact store

use crate::artifact::{Artifact, CacheKey};
use crate::error::StorageError;
use crate::storage::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Artifacts kept in memory, lost on exit
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<CacheKey, Artifact>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, StorageError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, artifact: &Artifact) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(artifact.key.clone(), artifact.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
