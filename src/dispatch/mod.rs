//! Request coordination
//!
//! [`Dispatcher::obtain_artifact`] turns a [`PackageRequest`] into a binary:
//! cache lookup, version resolution, and at most one build per key at a
//! time. Every caller asking for a key that is already building attaches to
//! the running job instead of starting another.
//!
//! ```text
//! request ─► platform check ─► cache (pinned) ─► resolve ─► cache
//!                                                             │ miss
//!                                   ┌─────────────────────────┘
//!                                   ▼
//!                 ┌──── jobs + negative cache (one lock) ────┐
//!                 │ failed recently?  ─► cached error         │
//!                 │ building?         ─► attach to job        │
//!                 │ otherwise         ─► spawn job            │
//!                 └───────────────────────────────────────────┘
//! ```
//!
//! Jobs run on their own task. A caller that stops waiting (timeout, client
//! gone) never cancels the build; later callers pick the result up from
//! storage.

mod negative;

pub use negative::NegativeCache;

use crate::artifact::{Artifact, CacheKey};
use crate::builder::{Builder, GoBuilder, SourceLocation};
use crate::config::schema::{Config, DispatcherConfig};
use crate::error::{BinsmithResult, BuildError, DispatchError};
use crate::request::PackageRequest;
use crate::resolver::{GitHubResolver, MemoizedResolver, Resolver};
use crate::storage::{create_storage, Storage};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

type JobOutcome = Result<Arc<Artifact>, DispatchError>;
type JobHandle = Shared<BoxFuture<'static, JobOutcome>>;

struct Job {
    id: u64,
    outcome: JobHandle,
}

/// In-flight builds and remembered failures. Both live under one lock so a
/// finishing job can record its failure and leave the table atomically.
#[derive(Default)]
struct Table {
    jobs: HashMap<CacheKey, Job>,
    failures: NegativeCache,
    next_id: u64,
}

struct Inner {
    resolver: Arc<dyn Resolver>,
    builder: Arc<dyn Builder>,
    storage: Arc<dyn Storage>,
    table: Mutex<Table>,
    build_slots: Semaphore,
    request_timeout: Duration,
    negative_ttl: Option<Duration>,
}

/// Build coordinator, cheap to clone
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        builder: Arc<dyn Builder>,
        storage: Arc<dyn Storage>,
        config: &DispatcherConfig,
        max_concurrent_builds: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                builder,
                storage,
                table: Mutex::new(Table::default()),
                build_slots: Semaphore::new(max_concurrent_builds.max(1)),
                request_timeout: config.request_timeout(),
                negative_ttl: config.negative_ttl(),
            }),
        }
    }

    /// Wire the GitHub resolver, Go builder and configured storage backend
    pub fn from_config(config: &Config) -> BinsmithResult<Self> {
        let resolver = MemoizedResolver::from_config(
            GitHubResolver::new(&config.resolver),
            &config.resolver,
        );
        let builder = GoBuilder::new(&config.builder, config.resolver.token.clone());
        let storage = create_storage(&config.storage)?;

        info!(
            storage = storage.backend_name(),
            max_builds = config.builder.max_concurrent_builds,
            "dispatcher ready"
        );

        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(builder),
            storage,
            &config.dispatcher,
            config.builder.max_concurrent_builds,
        ))
    }

    /// Produce the binary for `request`, from storage when possible.
    ///
    /// Bounded by the request timeout; on expiry the caller gets
    /// [`DispatchError::Timeout`] while any build it started keeps running.
    pub async fn obtain_artifact(&self, request: &PackageRequest) -> JobOutcome {
        let timeout = self.inner.request_timeout;
        match tokio::time::timeout(timeout, self.obtain(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(request = %request, secs = timeout.as_secs(), "request timed out");
                Err(DispatchError::Timeout {
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Number of builds currently in flight
    pub async fn active_builds(&self) -> usize {
        self.inner.table.lock().await.jobs.len()
    }

    async fn obtain(&self, request: &PackageRequest) -> JobOutcome {
        let inner = &self.inner;

        if !inner.builder.supports(&request.os, &request.arch) {
            return Err(BuildError::UnsupportedPlatform {
                os: request.os.clone(),
                arch: request.arch.clone(),
            }
            .into());
        }

        // Exact tags address the cache without asking upstream
        let pinned = request.pinned_key();
        if let Some(key) = &pinned {
            if let Some(artifact) = inner.lookup(key).await? {
                return Ok(artifact);
            }
        }

        debug!(request = %request, "resolving");
        let resolved = inner
            .resolver
            .resolve(&request.import_path, &request.version)
            .await?;
        let key = request.key_for(&resolved.version);

        if pinned.as_ref() != Some(&key) {
            if let Some(artifact) = inner.lookup(&key).await? {
                return Ok(artifact);
            }
        }

        let path = &request.import_path;
        let source = SourceLocation {
            archive_url: resolved.archive_url,
            module: format!("{}/{}/{}", path.host, path.owner, path.repo),
            subpath: path.subpath.clone(),
            binary_name: request.binary_name().to_string(),
        };

        let job = self.join_or_start(key, source).await?;
        job.await
    }

    /// Attach to the running job for `key`, or start one
    async fn join_or_start(
        &self,
        key: CacheKey,
        source: SourceLocation,
    ) -> Result<JobHandle, DispatchError> {
        let mut table = self.inner.table.lock().await;

        if let Some(err) = table.failures.get(&key, Instant::now()) {
            debug!(key = %key, "recent build failure, not retrying");
            return Err(err);
        }

        if let Some(job) = table.jobs.get(&key) {
            debug!(key = %key, job = job.id, "attaching to running build");
            return Ok(job.outcome.clone());
        }

        let id = table.next_id;
        table.next_id += 1;

        let inner = Arc::clone(&self.inner);
        let job_key = key.clone();
        let task = tokio::spawn(async move { inner.run_job(id, job_key, source).await });
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(DispatchError::Internal(format!("build task: {}", e))))
        }
        .boxed()
        .shared();

        debug!(key = %key, job = id, "build queued");
        table.jobs.insert(
            key,
            Job {
                id,
                outcome: outcome.clone(),
            },
        );
        Ok(outcome)
    }
}

impl Inner {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<Artifact>>, DispatchError> {
        let found = self.storage.get(key).await?;
        debug!(key = %key, hit = found.is_some(), "cache lookup");
        Ok(found.map(Arc::new))
    }

    /// Body of a spawned job. Leaves the table only after the outcome is
    /// stored or remembered, so no caller can slip in between and rebuild.
    async fn run_job(self: Arc<Self>, id: u64, key: CacheKey, source: SourceLocation) -> JobOutcome {
        let outcome = AssertUnwindSafe(self.execute(&key, &source))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DispatchError::Internal("build panicked".to_string())));

        let mut table = self.table.lock().await;
        if let (Err(err), Some(ttl)) = (&outcome, self.negative_ttl) {
            if err.is_build_failure() {
                table
                    .failures
                    .insert(key.clone(), err.clone(), Instant::now() + ttl);
            }
        }
        if table.jobs.get(&key).is_some_and(|job| job.id == id) {
            table.jobs.remove(&key);
        }
        drop(table);

        match &outcome {
            Ok(artifact) => debug!(key = %key, job = id, size = artifact.size, "build finished"),
            Err(err) => debug!(key = %key, job = id, error = %err, "build failed"),
        }
        outcome
    }

    async fn execute(&self, key: &CacheKey, source: &SourceLocation) -> JobOutcome {
        // Another job may have stored it between the caller's lookup and now
        if let Some(artifact) = self.lookup(key).await? {
            return Ok(artifact);
        }

        let _slot = self
            .build_slots
            .acquire()
            .await
            .map_err(|_| DispatchError::Internal("build slots closed".to_string()))?;

        debug!(key = %key, "building");
        let artifact = self.builder.build(key, source).await?;

        if let Err(e) = self.storage.put(&artifact).await {
            warn!(key = %key, error = %e, "failed to store artifact, serving uncached");
        }
        Ok(Arc::new(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResolveError, StorageError};
    use crate::request::{ImportPath, VersionConstraint};
    use crate::resolver::ResolvedVersion;
    use crate::storage::{FsStorage, MemoryStorage};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct FakeResolver {
        calls: AtomicU32,
        latest: &'static str,
    }

    impl FakeResolver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                latest: "v2.0.0",
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn resolve(
            &self,
            path: &ImportPath,
            constraint: &VersionConstraint,
        ) -> Result<ResolvedVersion, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.repo == "missing" {
                return Err(ResolveError::not_found(path.to_string()));
            }
            let version = constraint.pinned_tag().unwrap_or(self.latest).to_string();
            Ok(ResolvedVersion {
                archive_url: format!("https://example.test/{}/{}", path.package(), version),
                version,
                resolved_at: Utc::now(),
            })
        }
    }

    struct FakeBuilder {
        calls: AtomicU32,
        delay: Duration,
        fail: bool,
    }

    impl FakeBuilder {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
                fail,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Builder for FakeBuilder {
        fn supports(&self, os: &str, arch: &str) -> bool {
            matches!((os, arch), ("linux", "amd64") | ("darwin", "arm64"))
        }

        async fn build(
            &self,
            key: &CacheKey,
            source: &SourceLocation,
        ) -> Result<Artifact, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(BuildError::compile("undefined: main"));
            }
            let bytes = format!("{}:{}", source.binary_name, key).into_bytes();
            Ok(Artifact::new(key.clone(), bytes))
        }
    }

    /// Storage that reads fine but refuses every write
    struct ReadOnlyStorage;

    #[async_trait]
    impl Storage for ReadOnlyStorage {
        async fn get(&self, _key: &CacheKey) -> Result<Option<Artifact>, StorageError> {
            Ok(None)
        }

        async fn put(&self, artifact: &Artifact) -> Result<(), StorageError> {
            Err(StorageError::write_failed(
                artifact.key.object_path(),
                "read-only",
            ))
        }

        fn backend_name(&self) -> &'static str {
            "read-only"
        }
    }

    fn config(request_timeout_secs: u64, negative_ttl_secs: u64) -> DispatcherConfig {
        DispatcherConfig {
            request_timeout_secs,
            negative_ttl_secs,
        }
    }

    fn dispatcher(
        resolver: &Arc<FakeResolver>,
        builder: &Arc<FakeBuilder>,
        storage: Arc<dyn Storage>,
        config: &DispatcherConfig,
    ) -> Dispatcher {
        Dispatcher::new(resolver.clone(), builder.clone(), storage, config, 4)
    }

    fn request(spec: &str) -> PackageRequest {
        PackageRequest::parse(spec, "linux", "amd64").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_build() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::from_secs(5), false);
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = dispatcher(&resolver, &builder, storage.clone(), &config(600, 300));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.obtain_artifact(&request("tj/triage@v1.0.0")).await
            }));
        }

        let mut checksums = Vec::new();
        for handle in handles {
            checksums.push(handle.await.unwrap().unwrap().checksum.clone());
        }

        assert_eq!(builder.calls(), 1);
        assert!(checksums.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(storage.len().await, 1);
        assert_eq!(dispatcher.active_builds().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_failures_share_one_build() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::from_secs(5), true);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 300),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dispatcher = dispatcher.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.obtain_artifact(&request("tj/triage@v1.0.0")).await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(
                err,
                DispatchError::Build(BuildError::CompileFailed { .. })
            ));
        }
        assert_eq!(builder.calls(), 1);
    }

    #[tokio::test]
    async fn trailing_name_renames_binary_not_package() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = dispatcher(&resolver, &builder, storage, &config(600, 300));

        let artifact = dispatcher
            .obtain_artifact(&request("tj/triage@v1.0.0/tri"))
            .await
            .unwrap();

        assert_eq!(artifact.key.package, "tj/triage");
        assert!(String::from_utf8_lossy(&artifact.bytes).starts_with("tri:"));
    }

    #[tokio::test]
    async fn pinned_hit_skips_resolution_and_build() {
        let root = TempDir::new().unwrap();
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let storage = Arc::new(FsStorage::new(root.path().to_path_buf(), ""));
        let dispatcher = dispatcher(&resolver, &builder, storage, &config(600, 300));

        let req = request("example.org/foo/bar@v1.2.0");
        let first = dispatcher.obtain_artifact(&req).await.unwrap();
        assert_eq!(resolver.calls(), 1);
        assert_eq!(builder.calls(), 1);
        assert!(root.path().join("foo/bar/v1.2.0/linux/amd64").is_file());

        let second = dispatcher.obtain_artifact(&req).await.unwrap();
        assert_eq!(resolver.calls(), 1);
        assert_eq!(builder.calls(), 1);
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(second.bytes, first.bytes);
    }

    #[tokio::test]
    async fn latest_always_resolves() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 300),
        );

        let req = request("tj/triage");
        let first = dispatcher.obtain_artifact(&req).await.unwrap();
        let second = dispatcher.obtain_artifact(&req).await.unwrap();

        assert_eq!(first.key.version, "v2.0.0");
        assert_eq!(resolver.calls(), 2);
        assert_eq!(builder.calls(), 1);
        assert_eq!(first.checksum, second.checksum);
    }

    #[tokio::test]
    async fn unsupported_platform_never_builds() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 300),
        );

        let req = PackageRequest::parse("tj/triage@v1.0.0", "plan9", "mips").unwrap();
        let err = dispatcher.obtain_artifact(&req).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(builder.calls(), 0);
    }

    #[tokio::test]
    async fn resolution_failure_is_propagated() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 300),
        );

        let err = dispatcher
            .obtain_artifact(&request("tj/missing"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 404);
        assert_eq!(builder.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_builds_are_remembered_until_ttl() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, true);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 30),
        );
        let req = request("tj/triage@v1.0.0");

        let first = dispatcher.obtain_artifact(&req).await.unwrap_err();
        let second = dispatcher.obtain_artifact(&req).await.unwrap_err();
        assert_eq!(first, second);
        assert_eq!(builder.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        dispatcher.obtain_artifact(&req).await.unwrap_err();
        assert_eq!(builder.calls(), 2);
    }

    #[tokio::test]
    async fn zero_ttl_disables_negative_cache() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, true);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 0),
        );
        let req = request("tj/triage@v1.0.0");

        dispatcher.obtain_artifact(&req).await.unwrap_err();
        dispatcher.obtain_artifact(&req).await.unwrap_err();
        assert_eq!(builder.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_caller_does_not_cancel_build() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::from_secs(10), false);
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = dispatcher(&resolver, &builder, storage.clone(), &config(1, 300));
        let req = request("tj/triage@v1.0.0");

        let err = dispatcher.obtain_artifact(&req).await.unwrap_err();
        assert_eq!(err, DispatchError::Timeout { secs: 1 });
        assert_eq!(dispatcher.active_builds().await, 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(storage.len().await, 1);
        assert_eq!(dispatcher.active_builds().await, 0);

        dispatcher.obtain_artifact(&req).await.unwrap();
        assert_eq!(builder.calls(), 1);
    }

    #[tokio::test]
    async fn store_failure_still_serves_artifact() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let dispatcher = dispatcher(&resolver, &builder, Arc::new(ReadOnlyStorage), &config(600, 300));

        let artifact = dispatcher
            .obtain_artifact(&request("tj/triage@v1.0.0"))
            .await
            .unwrap();
        assert_eq!(artifact.key.object_path(), "tj/triage/v1.0.0/linux/amd64");
    }

    #[tokio::test]
    async fn platforms_are_separate_keys() {
        let resolver = FakeResolver::new();
        let builder = FakeBuilder::new(Duration::ZERO, false);
        let dispatcher = dispatcher(
            &resolver,
            &builder,
            Arc::new(MemoryStorage::new()),
            &config(600, 300),
        );

        let linux = request("tj/triage@v1.0.0");
        let darwin = PackageRequest::parse("tj/triage@v1.0.0", "darwin", "arm64").unwrap();
        let a = dispatcher.obtain_artifact(&linux).await.unwrap();
        let b = dispatcher.obtain_artifact(&darwin).await.unwrap();

        assert_ne!(a.checksum, b.checksum);
        assert_eq!(builder.calls(), 2);
    }
}
