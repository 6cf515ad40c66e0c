//! Cache keys and built artifacts
//!
//! A [`CacheKey`] is only ever built from a concrete version, so a stored
//! artifact never changes meaning: same key, same binary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of one buildable binary
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Host-relative package path, `owner/repo[/subpath]`
    pub package: String,
    /// Concrete tag or commit
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl CacheKey {
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Object path, `owner/repo[/subpath]/{version}/{os}/{arch}`.
    ///
    /// The version is escaped so a tag like `release/1.0` stays one segment.
    pub fn object_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.package,
            escape_segment(&self.version),
            self.os,
            self.arch
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {}/{}",
            self.package, self.version, self.os, self.arch
        )
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._+-]`
fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-' | b'+') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// A compiled binary, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: CacheKey,
    pub bytes: Vec<u8>,
    /// SHA256 of `bytes`, lowercase hex
    pub checksum: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Wrap freshly produced bytes, computing checksum and size
    pub fn new(key: CacheKey, bytes: Vec<u8>) -> Self {
        Self::with_created_at(key, bytes, Utc::now())
    }

    pub fn with_created_at(key: CacheKey, bytes: Vec<u8>, created_at: DateTime<Utc>) -> Self {
        let checksum = checksum(&bytes);
        let size = bytes.len() as u64;
        Self {
            key,
            bytes,
            checksum,
            size,
            created_at,
        }
    }
}

/// SHA256 of a byte slice as lowercase hex
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
