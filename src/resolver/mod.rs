//! Version resolution
//!
//! Turns an import path plus a version constraint into a concrete tag or
//! commit and the archive URL to fetch it from.

mod github;
mod memo;
mod retry;
pub mod select;

pub use github::GitHubResolver;
pub use memo::MemoizedResolver;
pub use retry::RetryPolicy;

use crate::error::ResolveError;
use crate::request::{ImportPath, VersionConstraint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A constraint pinned down to one immutable version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Tag name, or commit SHA when the repository has no tags
    pub version: String,
    /// Where the source archive for `version` can be downloaded
    pub archive_url: String,
    pub resolved_at: DateTime<Utc>,
}

/// Source of concrete versions
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `constraint` for the package at `path`
    async fn resolve(
        &self,
        path: &ImportPath,
        constraint: &VersionConstraint,
    ) -> Result<ResolvedVersion, ResolveError>;
}
