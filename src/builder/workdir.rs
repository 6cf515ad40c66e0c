//! Per-job working directories

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Exclusive scratch directory for one build.
///
/// Removed by [`WorkDir::cleanup`] or, if the job is abandoned midway
/// (error, timeout, task cancelled), when dropped.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    armed: bool,
}

impl WorkDir {
    /// Create `{root}/{uuid}`
    pub async fn create(root: &Path) -> io::Result<Self> {
        let path = root.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "created build directory");
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, child: impl AsRef<Path>) -> PathBuf {
        self.path.join(child)
    }

    /// Remove the directory now
    pub async fn cleanup(mut self) {
        self.armed = false;
        if let Err(e) = fs::remove_dir_all(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove build directory");
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove build directory");
            }
        }
    }
}
