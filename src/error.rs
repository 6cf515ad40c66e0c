//! Error types for binsmith
//!
//! Application-level code uses `BinsmithResult<T>`. The build pipeline has its
//! own per-component taxonomy; those errors are `Clone` because one build
//! outcome is handed to every caller waiting on it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for binsmith operations
pub type BinsmithResult<T> = Result<T, BinsmithError>;

/// Errors from the application shell (configuration, CLI, startup)
#[derive(Error, Debug)]
pub enum BinsmithError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown storage backend: {0}")]
    UnknownStorageBackend(String),

    #[error("Storage backend '{backend}' requires `{field}` to be set")]
    StorageSettingMissing { backend: String, field: &'static str },

    // Request errors
    #[error("Invalid package path '{path}': {reason}")]
    InvalidPackagePath { path: String, reason: String },

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    // Pipeline errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BinsmithError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid package path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPackagePath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPackagePath { .. } => {
                Some("Use the form owner/repo[/path/to/cmd][@version], e.g. tj/triage@v1.0.0")
            }
            Self::StorageSettingMissing { .. } => Some("Run: binsmith config show"),
            Self::Dispatch(DispatchError::Resolve(ResolveError::RateLimited { .. })) => {
                Some("Set GITHUB_TOKEN to raise the GitHub API rate limit")
            }
            Self::Dispatch(DispatchError::Build(BuildError::UnsupportedPlatform { .. })) => {
                Some("Run: binsmith platforms")
            }
            _ => None,
        }
    }
}

/// Version resolution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("GitHub API rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("GitHub API unavailable: {reason}")]
    UpstreamUnavailable { reason: String },
}

impl ResolveError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn upstream(reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            reason: reason.into(),
        }
    }
}

/// Build failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Failed to fetch source: {reason}")]
    FetchFailed { reason: String },

    #[error("Compilation failed: {output}")]
    CompileFailed { output: String },

    #[error("Build exceeded {secs}s time limit")]
    Timeout { secs: u64 },

    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },
}

impl BuildError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            reason: reason.into(),
        }
    }

    pub fn compile(output: impl Into<String>) -> Self {
        Self::CompileFailed {
            output: output.into(),
        }
    }
}

/// Artifact storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Failed to write {object}: {reason}")]
    WriteFailed { object: String, reason: String },
}

impl StorageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn write_failed(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            object: object.into(),
            reason: reason.into(),
        }
    }
}

/// Everything `Dispatcher::obtain_artifact` can fail with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Timed out after {secs}s waiting for build")]
    Timeout { secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status an adapter should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Resolve(ResolveError::NotFound { .. }) => 404,
            Self::Resolve(ResolveError::RateLimited { .. }) => 429,
            Self::Resolve(ResolveError::UpstreamUnavailable { .. }) => 502,
            Self::Build(BuildError::FetchFailed { .. } | BuildError::CompileFailed { .. }) => 502,
            Self::Build(BuildError::Timeout { .. }) | Self::Timeout { .. } => 504,
            Self::Build(BuildError::UnsupportedPlatform { .. }) => 400,
            Self::Storage(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether this outcome may be remembered in the negative cache
    pub fn is_build_failure(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}
