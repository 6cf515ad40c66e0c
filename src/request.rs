//! Package requests
//!
//! Parses the inbound `owner/repo[/subpath][@version[/binary]]` form into a
//! structured [`PackageRequest`]. A version is either `latest`, an exact tag,
//! or a semver range; only exact tags can address the cache directly.

use crate::artifact::CacheKey;
use crate::error::{BinsmithError, BinsmithResult};
use semver::{Version, VersionReq};
use std::fmt;

/// Host assumed when the path does not name one
pub const DEFAULT_HOST: &str = "github.com";

/// Longest accepted version string
const MAX_VERSION_LEN: usize = 128;

/// A Go package location on the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportPath {
    pub host: String,
    pub owner: String,
    pub repo: String,
    /// Package directory inside the repository, if not the root
    pub subpath: Option<String>,
}

impl ImportPath {
    /// Parse `[host/]owner/repo[/subpath]`
    pub fn parse(path: &str) -> BinsmithResult<Self> {
        let trimmed = path.trim_matches('/');
        let mut segments: Vec<&str> = trimmed.split('/').collect();

        // A leading segment with a dot is a host, GitHub owners can't contain one
        let host = if segments.len() > 2 && segments[0].contains('.') {
            segments.remove(0).to_ascii_lowercase()
        } else {
            DEFAULT_HOST.to_string()
        };

        if segments.len() < 2 {
            return Err(BinsmithError::invalid_path(
                path,
                "expected at least owner/repo",
            ));
        }

        for segment in &segments {
            validate_segment(path, segment)?;
        }

        let subpath = if segments.len() > 2 {
            Some(segments[2..].join("/"))
        } else {
            None
        };

        Ok(Self {
            host,
            owner: segments[0].to_string(),
            repo: segments[1].to_string(),
            subpath,
        })
    }

    /// Host-relative package path, `owner/repo[/subpath]`
    pub fn package(&self) -> String {
        match &self.subpath {
            Some(sub) => format!("{}/{}/{}", self.owner, self.repo, sub),
            None => format!("{}/{}", self.owner, self.repo),
        }
    }

    /// Name of the produced binary: the last package segment
    pub fn binary_name(&self) -> &str {
        self.subpath
            .as_deref()
            .and_then(|sub| sub.rsplit('/').next())
            .unwrap_or(&self.repo)
    }
}

impl fmt::Display for ImportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.package())
    }
}

fn validate_segment(path: &str, segment: &str) -> BinsmithResult<()> {
    if segment.is_empty() {
        return Err(BinsmithError::invalid_path(path, "empty path segment"));
    }
    if segment == "." || segment == ".." {
        return Err(BinsmithError::invalid_path(
            path,
            "relative path segments are not allowed",
        ));
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(BinsmithError::invalid_path(
            path,
            format!("invalid characters in '{}'", segment),
        ));
    }
    Ok(())
}

/// What version of a package the caller asked for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// Highest released version, or the default branch head
    Latest,
    /// An exact tag
    Pinned(String),
    /// Highest tag satisfying a semver requirement, e.g. `v1` or `^1.2`
    Range(VersionReq),
}

impl VersionConstraint {
    /// Parse the part after `@`
    pub fn parse(version: &str) -> BinsmithResult<Self> {
        let version = version.trim();

        if version.is_empty()
            || version.eq_ignore_ascii_case("latest")
            || version == "master"
        {
            return Ok(Self::Latest);
        }

        if version.len() > MAX_VERSION_LEN {
            return Err(BinsmithError::InvalidVersion {
                version: version.to_string(),
                reason: "too long".to_string(),
            });
        }
        if version.contains("..") || version.chars().any(|c| c.is_whitespace() || c == '\\') {
            return Err(BinsmithError::InvalidVersion {
                version: version.to_string(),
                reason: "contains forbidden characters".to_string(),
            });
        }

        let bare = version.strip_prefix('v').unwrap_or(version);
        if Version::parse(bare).is_ok() {
            return Ok(Self::Pinned(version.to_string()));
        }
        if let Ok(req) = VersionReq::parse(bare) {
            return Ok(Self::Range(req));
        }

        Ok(Self::Pinned(version.to_string()))
    }

    /// The concrete tag, if this constraint names one
    pub fn pinned_tag(&self) -> Option<&str> {
        match self {
            Self::Pinned(tag) => Some(tag),
            _ => None,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Pinned(tag) => write!(f, "{}", tag),
            Self::Range(req) => write!(f, "{}", req),
        }
    }
}

/// A request for one binary at one version for one platform
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRequest {
    pub import_path: ImportPath,
    pub version: VersionConstraint,
    pub os: String,
    pub arch: String,
    /// Output file name given after the version, if any
    pub binary_name: Option<String>,
}

impl PackageRequest {
    /// Parse `[host/]owner/repo[/subpath][@version[/binary]]`.
    ///
    /// The package directory always comes before the `@`. A single segment
    /// after the version only names the produced binary.
    pub fn parse(spec: &str, os: &str, arch: &str) -> BinsmithResult<Self> {
        let (path, version, trailing) = match spec.split_once('@') {
            Some((path, rest)) => match rest.split_once('/') {
                Some((version, trailing)) => (path, version, Some(trailing)),
                None => (path, rest, None),
            },
            None => (spec, "", None),
        };

        let binary_name = match trailing.map(|t| t.trim_matches('/')).filter(|t| !t.is_empty()) {
            Some(name) if name.contains('/') => {
                return Err(BinsmithError::invalid_path(
                    spec,
                    "only a binary name may follow the version; put package directories before '@'",
                ))
            }
            Some(name) => {
                validate_segment(spec, name)?;
                Some(name.to_string())
            }
            None => None,
        };

        Ok(Self {
            import_path: ImportPath::parse(path)?,
            version: VersionConstraint::parse(version)?,
            os: validate_platform_part(spec, "os", os)?,
            arch: validate_platform_part(spec, "arch", arch)?,
            binary_name,
        })
    }

    /// Name of the produced binary: the explicit name, else the package's
    /// last segment
    pub fn binary_name(&self) -> &str {
        self.binary_name
            .as_deref()
            .unwrap_or_else(|| self.import_path.binary_name())
    }

    /// Cache key for an already-concrete version
    pub fn key_for(&self, version: &str) -> CacheKey {
        CacheKey::new(
            self.import_path.package(),
            version,
            self.os.clone(),
            self.arch.clone(),
        )
    }

    /// Cache key derivable without resolution (pinned tags only)
    pub fn pinned_key(&self) -> Option<CacheKey> {
        self.version.pinned_tag().map(|tag| self.key_for(tag))
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({}/{})",
            self.import_path, self.version, self.os, self.arch
        )
    }
}

fn validate_platform_part(spec: &str, what: &str, value: &str) -> BinsmithResult<String> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BinsmithError::invalid_path(
            spec,
            format!("invalid {} '{}'", what, value),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_owner_repo() {
        let path = ImportPath::parse("tj/triage").unwrap();
        assert_eq!(path.host, "github.com");
        assert_eq!(path.owner, "tj");
        assert_eq!(path.repo, "triage");
        assert_eq!(path.subpath, None);
        assert_eq!(path.binary_name(), "triage");
    }

    #[test]
    fn parse_host_and_subpath() {
        let path = ImportPath::parse("example.org/foo/bar/cmd/baz").unwrap();
        assert_eq!(path.host, "example.org");
        assert_eq!(path.package(), "foo/bar/cmd/baz");
        assert_eq!(path.binary_name(), "baz");
        assert_eq!(path.to_string(), "example.org/foo/bar/cmd/baz");
    }

    #[test]
    fn reject_traversal_and_junk() {
        assert!(ImportPath::parse("tj").is_err());
        assert!(ImportPath::parse("tj/../etc").is_err());
        assert!(ImportPath::parse("tj/tri age").is_err());
        assert!(ImportPath::parse("tj//triage").is_err());
    }

    #[test]
    fn version_constraints() {
        assert_eq!(VersionConstraint::parse("").unwrap(), VersionConstraint::Latest);
        assert_eq!(
            VersionConstraint::parse("master").unwrap(),
            VersionConstraint::Latest
        );
        assert_eq!(
            VersionConstraint::parse("v1.2.0").unwrap(),
            VersionConstraint::Pinned("v1.2.0".to_string())
        );
        assert_eq!(
            VersionConstraint::parse("nightly-2024").unwrap(),
            VersionConstraint::Pinned("nightly-2024".to_string())
        );
        assert!(matches!(
            VersionConstraint::parse("v1").unwrap(),
            VersionConstraint::Range(_)
        ));
        assert!(matches!(
            VersionConstraint::parse("^1.2").unwrap(),
            VersionConstraint::Range(_)
        ));
        assert!(VersionConstraint::parse("a b").is_err());
    }

    #[test]
    fn parse_full_request() {
        let req = PackageRequest::parse("example.org/foo/bar@v1.2.0", "Linux", "amd64").unwrap();
        assert_eq!(req.import_path.package(), "foo/bar");
        assert_eq!(req.version, VersionConstraint::Pinned("v1.2.0".into()));
        assert_eq!(req.os, "linux");

        let key = req.pinned_key().unwrap();
        assert_eq!(key.package, "foo/bar");
        assert_eq!(key.version, "v1.2.0");
    }

    #[test]
    fn binary_name_after_version() {
        let req = PackageRequest::parse("tj/triage@v1.0.0/triage", "darwin", "arm64").unwrap();
        assert_eq!(req.import_path.subpath, None);
        assert_eq!(req.import_path.package(), "tj/triage");
        assert_eq!(req.version, VersionConstraint::Pinned("v1.0.0".into()));
        assert_eq!(req.binary_name(), "triage");
        assert_eq!(req.pinned_key().unwrap().package, "tj/triage");

        let renamed = PackageRequest::parse("tj/triage@v1.0.0/tri", "linux", "amd64").unwrap();
        assert_eq!(renamed.import_path.subpath, None);
        assert_eq!(renamed.binary_name(), "tri");
    }

    #[test]
    fn subpath_before_version() {
        let req = PackageRequest::parse("foo/bar/cmd/baz@v1.2.0", "linux", "amd64").unwrap();
        assert_eq!(req.import_path.subpath.as_deref(), Some("cmd/baz"));
        assert_eq!(req.binary_name(), "baz");

        let named = PackageRequest::parse("foo/bar/cmd/baz@v1.2.0/qux", "linux", "amd64").unwrap();
        assert_eq!(named.import_path.subpath.as_deref(), Some("cmd/baz"));
        assert_eq!(named.binary_name(), "qux");
    }

    #[test]
    fn reject_directory_after_version() {
        assert!(PackageRequest::parse("tj/triage@v1.0.0/cmd/triage", "linux", "amd64").is_err());
        assert!(PackageRequest::parse("tj/triage@v1.0.0/..", "linux", "amd64").is_err());
    }

    #[test]
    fn latest_has_no_pinned_key() {
        let req = PackageRequest::parse("tj/triage", "linux", "amd64").unwrap();
        assert_eq!(req.version, VersionConstraint::Latest);
        assert!(req.pinned_key().is_none());
    }

    #[test]
    fn reject_bad_platform() {
        assert!(PackageRequest::parse("tj/triage", "linux/x", "amd64").is_err());
        assert!(PackageRequest::parse("tj/triage", "linux", "").is_err());
    }
}
