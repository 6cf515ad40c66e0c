//! Short-lived memoization of resolutions
//!
//! Pinned tags are immutable and can be remembered for a while. `latest` and
//! ranges move when upstream publishes, so they only live for the freshness
//! window. Errors are never remembered.

use crate::config::schema::ResolverConfig;
use crate::error::ResolveError;
use crate::request::{ImportPath, VersionConstraint};
use crate::resolver::{ResolvedVersion, Resolver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

type MemoKey = (ImportPath, VersionConstraint);

struct MemoEntry {
    resolved: ResolvedVersion,
    stored_at: Instant,
    ttl: Duration,
}

impl MemoEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

/// Resolver decorator with a bounded, time-limited memo
pub struct MemoizedResolver<R> {
    inner: R,
    entries: Mutex<HashMap<MemoKey, MemoEntry>>,
    capacity: usize,
    pinned_ttl: Duration,
    latest_ttl: Duration,
}

impl<R: Resolver> MemoizedResolver<R> {
    pub fn new(inner: R, capacity: usize, pinned_ttl: Duration, latest_ttl: Duration) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            capacity,
            pinned_ttl,
            latest_ttl,
        }
    }

    pub fn from_config(inner: R, config: &ResolverConfig) -> Self {
        Self::new(
            inner,
            config.memo_capacity,
            config.memo_ttl(),
            config.latest_ttl(),
        )
    }

    fn ttl_for(&self, constraint: &VersionConstraint) -> Duration {
        match constraint {
            VersionConstraint::Pinned(_) => self.pinned_ttl,
            VersionConstraint::Latest | VersionConstraint::Range(_) => self.latest_ttl,
        }
    }

    async fn remember(&self, key: MemoKey, resolved: ResolvedVersion) {
        if self.capacity == 0 {
            return;
        }
        let ttl = self.ttl_for(&key.1);
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_fresh(now));

        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            MemoEntry {
                resolved,
                stored_at: now,
                ttl,
            },
        );
    }
}

#[async_trait]
impl<R: Resolver> Resolver for MemoizedResolver<R> {
    async fn resolve(
        &self,
        path: &ImportPath,
        constraint: &VersionConstraint,
    ) -> Result<ResolvedVersion, ResolveError> {
        let key = (path.clone(), constraint.clone());

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if entry.is_fresh(Instant::now()) {
                    debug!(package = %path, constraint = %constraint, "resolution served from memo");
                    return Ok(entry.resolved.clone());
                }
            }
        }

        let resolved = self.inner.resolve(path, constraint).await?;
        self.remember(key, resolved.clone()).await;
        Ok(resolved)
    }
}
