//! Remembered build failures

use crate::artifact::CacheKey;
use crate::error::DispatchError;
use std::collections::HashMap;
use tokio::time::Instant;

struct Failure {
    error: DispatchError,
    expires_at: Instant,
}

/// Recent failed builds by key, each with its own expiry
#[derive(Default)]
pub struct NegativeCache {
    entries: HashMap<CacheKey, Failure>,
}

impl NegativeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remembered error for `key`, if it hasn't expired by `now`
    pub fn get(&mut self, key: &CacheKey, now: Instant) -> Option<DispatchError> {
        match self.entries.get(key) {
            Some(failure) if failure.expires_at > now => Some(failure.error.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remember `error` for `key` until `expires_at`
    pub fn insert(&mut self, key: CacheKey, error: DispatchError, expires_at: Instant) {
        let now = Instant::now();
        self.entries.retain(|_, failure| failure.expires_at > now);
        self.entries.insert(key, Failure { error, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use std::time::Duration;

    fn key(version: &str) -> CacheKey {
        CacheKey::new("foo/bar", version, "linux", "amd64")
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let mut cache = NegativeCache::new();
        let err: DispatchError = BuildError::compile("boom").into();
        cache.insert(key("v1"), err.clone(), Instant::now() + Duration::from_secs(30));

        assert_eq!(cache.get(&key("v1"), Instant::now()), Some(err));
        assert_eq!(cache.get(&key("v2"), Instant::now()), None);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get(&key("v1"), Instant::now()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_purges_expired() {
        let mut cache = NegativeCache::new();
        let err: DispatchError = BuildError::compile("boom").into();
        cache.insert(key("v1"), err.clone(), Instant::now() + Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert(key("v2"), err, Instant::now() + Duration::from_secs(1));

        assert_eq!(cache.len(), 1);
    }
}
