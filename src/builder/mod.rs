//! Compiling a resolved source archive into one binary
//!
//! The toolchain is always an external process: a crashing or hanging
//! compiler can fail its own job but cannot touch coordinator state.

mod go;
mod process;
mod unpack;
mod workdir;

pub use go::GoBuilder;
pub use process::{run_step, Limits, StepFailure};
pub use workdir::WorkDir;

use crate::artifact::{Artifact, CacheKey};
use crate::error::BuildError;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Where to get the source and what to build from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Tarball of the repository at the resolved version
    pub archive_url: String,
    /// Go module path of the repository root, e.g. `github.com/tj/triage`
    pub module: String,
    /// Package directory inside the repository
    pub subpath: Option<String>,
    /// File name of the produced binary
    pub binary_name: String,
}

/// Produces binaries for a target platform
#[async_trait]
pub trait Builder: Send + Sync {
    /// Whether `(os, arch)` can be built at all
    fn supports(&self, os: &str, arch: &str) -> bool;

    /// Build the package at `source` for the platform in `key`
    async fn build(&self, key: &CacheKey, source: &SourceLocation) -> Result<Artifact, BuildError>;
}

/// Set of `os/arch` targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSet {
    targets: BTreeSet<(String, String)>,
}

impl PlatformSet {
    /// Parse `"os/arch"` entries; malformed entries are skipped
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let targets = entries
            .iter()
            .filter_map(|entry| {
                let (os, arch) = entry.as_ref().trim().split_once('/')?;
                (!os.is_empty() && !arch.is_empty())
                    .then(|| (os.to_ascii_lowercase(), arch.to_ascii_lowercase()))
            })
            .collect();
        Self { targets }
    }

    pub fn contains(&self, os: &str, arch: &str) -> bool {
        self.targets
            .iter()
            .any(|(o, a)| o == os && a == arch)
    }

    /// Targets as `os/arch`, sorted
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.targets.iter().map(|(os, arch)| format!("{}/{}", os, arch))
    }
}
