//! Filesystem artifact store
//!
//! Objects live at `{root}/{prefix}/{object path}`. A put writes a uniquely
//! named sibling and renames it into place; rename is atomic on one
//! filesystem, so readers see either the old or the new binary.

use crate::artifact::{Artifact, CacheKey};
use crate::error::StorageError;
use crate::storage::{object_name, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Artifacts stored as plain files under a root directory
pub struct FsStorage {
    root: PathBuf,
    prefix: String,
}

impl FsStorage {
    pub fn new(root: PathBuf, prefix: &str) -> Self {
        Self {
            root,
            prefix: prefix.to_string(),
        }
    }

    fn object_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(object_name(&self.prefix, key))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, StorageError> {
        let path = self.object_path(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound || is_path_collision(&e) => return Ok(None),
            Err(e) => {
                return Err(StorageError::unavailable(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let created_at = fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        debug!(path = %path.display(), size = bytes.len(), "read artifact");
        Ok(Some(Artifact::with_created_at(key.clone(), bytes, created_at)))
    }

    async fn put(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let path = self.object_path(&artifact.key);
        let object = path.display().to_string();
        let write_failed = |e: std::io::Error| StorageError::write_failed(&object, e.to_string());

        let parent = path
            .parent()
            .ok_or_else(|| StorageError::write_failed(&object, "object has no parent directory"))?;
        fs::create_dir_all(parent).await.map_err(write_failed)?;

        let staging = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&staging, &artifact.bytes).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_failed(e));
        }
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(write_failed(e));
        }

        debug!(path = %object, size = artifact.size, "stored artifact");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "fs"
    }
}

/// Another object's file or directory sits where this object's path runs,
/// e.g. `foo/bar@v1` versus package `foo/bar/v1/linux/amd64`
#[cfg(unix)]
fn is_path_collision(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::ENOTDIR || code == libc::EISDIR)
}

#[cfg(not(unix))]
fn is_path_collision(_e: &io::Error) -> bool {
    false
}
