//! Configuration schema for binsmith
//!
//! Configuration is stored at `~/.config/binsmith/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MEBIBYTE: u64 = 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// GitHub version resolution
    pub resolver: ResolverConfig,

    /// Go toolchain invocation
    pub builder: BuilderConfig,

    /// Artifact storage
    pub storage: StorageConfig,

    /// Build coordination
    pub dispatcher: DispatcherConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Target OS when a request doesn't name one
    pub default_os: String,

    /// Target architecture when a request doesn't name one
    pub default_arch: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            default_os: "linux".to_string(),
            default_arch: "amd64".to_string(),
        }
    }
}

/// GitHub resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// GitHub REST API base URL
    pub api_url: String,

    /// API token (overridden by GITHUB_TOKEN)
    pub token: Option<String>,

    /// Attempts per API call before giving up on rate limits or 5xx
    pub max_attempts: u32,

    /// First retry delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Retry delay ceiling in milliseconds
    pub max_backoff_ms: u64,

    /// Tags/releases requested per page
    pub page_size: u32,

    /// Maximum pages walked when listing tags
    pub max_pages: u32,

    /// Per-request HTTP timeout in seconds
    pub http_timeout_secs: u64,

    /// Memoized resolutions kept at most
    pub memo_capacity: usize,

    /// Lifetime of memoized pinned-tag resolutions in seconds
    pub memo_ttl_secs: u64,

    /// Lifetime of memoized latest/range resolutions in seconds
    pub latest_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            page_size: 100,
            max_pages: 10,
            http_timeout_secs: 30,
            memo_capacity: 1024,
            memo_ttl_secs: 3600,
            latest_ttl_secs: 60,
        }
    }
}

impl ResolverConfig {
    pub fn memo_ttl(&self) -> Duration {
        Duration::from_secs(self.memo_ttl_secs)
    }

    pub fn latest_ttl(&self) -> Duration {
        Duration::from_secs(self.latest_ttl_secs)
    }
}

/// Go builder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Path or name of the `go` executable
    pub go_binary: String,

    /// Directory holding per-job working directories (default: state dir)
    pub work_dir: Option<PathBuf>,

    /// Wall-clock limit for one build, fetch included
    pub timeout_secs: u64,

    /// CPU seconds the compiler may consume (0 = unlimited)
    pub cpu_limit_secs: u64,

    /// Largest file the compiler may write, in MB (0 = unlimited)
    pub max_file_mb: u64,

    /// Largest source archive accepted, in MB
    pub max_archive_mb: u64,

    /// GOPROXY used while downloading modules
    pub goproxy: String,

    /// Builds allowed to run at once
    pub max_concurrent_builds: usize,

    /// Supported targets as "os/arch"
    pub platforms: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            go_binary: "go".to_string(),
            work_dir: None,
            timeout_secs: 300,
            cpu_limit_secs: 600,
            max_file_mb: 512,
            max_archive_mb: 100,
            goproxy: "https://proxy.golang.org,direct".to_string(),
            max_concurrent_builds: 4,
            platforms: [
                "darwin/amd64",
                "darwin/arm64",
                "freebsd/amd64",
                "linux/386",
                "linux/amd64",
                "linux/arm",
                "linux/arm64",
                "windows/386",
                "windows/amd64",
                "windows/arm64",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl BuilderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb.saturating_mul(MEBIBYTE)
    }

    pub fn max_archive_bytes(&self) -> u64 {
        self.max_archive_mb.saturating_mul(MEBIBYTE)
    }
}

/// Artifact storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "fs", "gcs" or "memory"
    pub backend: String,

    /// Root directory for the fs backend (default: state dir)
    pub root: Option<PathBuf>,

    /// Object storage endpoint for the gcs backend
    pub endpoint: String,

    /// Bucket for the gcs backend
    pub bucket: Option<String>,

    /// Object name prefix
    pub prefix: String,

    /// Bearer token for the gcs backend (overridden by BINSMITH_STORAGE_TOKEN)
    pub token: Option<String>,

    /// Largest artifact accepted on read, in MB
    pub max_object_mb: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            root: None,
            endpoint: "https://storage.googleapis.com".to_string(),
            bucket: None,
            prefix: "production".to_string(),
            token: None,
            max_object_mb: 512,
        }
    }
}

impl StorageConfig {
    pub fn max_object_bytes(&self) -> u64 {
        self.max_object_mb.saturating_mul(MEBIBYTE)
    }
}

/// Build coordination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How long one caller waits for an artifact
    pub request_timeout_secs: u64,

    /// How long a failed build is remembered (0 = never)
    pub negative_ttl_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 600,
            negative_ttl_secs: 300,
        }
    }
}

impl DispatcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn negative_ttl(&self) -> Option<Duration> {
        (self.negative_ttl_secs > 0).then(|| Duration::from_secs(self.negative_ttl_secs))
    }
}
