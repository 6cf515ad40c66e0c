//! Picking a concrete version out of a repository's tags and releases

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::Deserialize;

/// Parse a tag as semver, tolerating a leading `v`
pub fn parse_tag(tag: &str) -> Option<Version> {
    let bare = tag.strip_prefix('v').unwrap_or(tag);
    Version::parse(bare).ok()
}

/// Highest semver tag, optionally restricted to those matching `req`.
///
/// Without a requirement, pre-releases are only considered when the
/// repository has no stable release at all.
pub fn highest_tag<'a, I>(tags: I, req: Option<&VersionReq>) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed: Vec<(Version, &str)> = tags
        .into_iter()
        .filter_map(|tag| parse_tag(tag).map(|v| (v, tag)))
        .filter(|(v, _)| req.is_none_or(|r| r.matches(v)))
        .collect();

    let pick = |stable_only: bool| {
        parsed
            .iter()
            .filter(|(v, _)| !stable_only || v.pre.is_empty())
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, tag)| *tag)
    };

    if req.is_some() {
        return pick(false);
    }
    pick(true).or_else(|| pick(false))
}

/// Release entry from the GitHub releases API
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// Most recently published non-draft release
pub fn latest_release(releases: &[Release]) -> Option<&Release> {
    releases
        .iter()
        .filter(|r| !r.draft)
        .filter(|r| r.published_at.is_some())
        .max_by_key(|r| r.published_at)
}
