//! GitHub REST API resolver

use crate::config::schema::ResolverConfig;
use crate::error::ResolveError;
use crate::http::{bearer, HttpClient, HttpResponse};
use crate::request::{ImportPath, VersionConstraint};
use crate::resolver::retry::RetryPolicy;
use crate::resolver::select::{highest_tag, latest_release, Release};
use crate::resolver::{ResolvedVersion, Resolver};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// API responses are small; anything bigger is not what we asked for
const MAX_API_BODY: u64 = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct Commit {
    sha: String,
}

/// Resolves versions against the GitHub REST API
pub struct GitHubResolver {
    http: HttpClient,
    api_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: u32,
}

impl GitHubResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            http: HttpClient::new(Duration::from_secs(config.http_timeout_secs)),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            retry: RetryPolicy::from_config(config),
            page_size: config.page_size.clamp(1, 100),
            max_pages: config.max_pages.max(1),
        }
    }

    fn repo_url(&self, path: &ImportPath) -> String {
        format!("{}/repos/{}/{}", self.api_url, path.owner, path.repo)
    }

    fn archive_url(&self, path: &ImportPath, reference: &str) -> String {
        format!("{}/tarball/{}", self.repo_url(path), reference)
    }

    /// GET with retries. `Ok(None)` means 404.
    async fn get(&self, url: &str) -> Result<Option<HttpResponse>, ResolveError> {
        let mut headers = vec![
            ("Accept", "application/vnd.github+json".to_string()),
            ("X-GitHub-Api-Version", "2022-11-28".to_string()),
        ];
        headers.extend(bearer(self.token.as_deref()));

        let mut attempt = 0;
        loop {
            attempt += 1;

            let (failure, floor) = match self.http.get(url, headers.clone(), MAX_API_BODY).await {
                Ok(resp) if resp.is_success() => return Ok(Some(resp)),
                Ok(resp) if resp.status == 404 => return Ok(None),
                Ok(resp) if is_rate_limited(&resp) => (Failure::RateLimited, rate_limit_floor(&resp)),
                Ok(resp) if resp.status >= 500 => {
                    (Failure::Transient(format!("HTTP {} from {}", resp.status, url)), None)
                }
                Ok(resp) => {
                    return Err(ResolveError::upstream(format!(
                        "HTTP {} from {}: {}",
                        resp.status,
                        url,
                        resp.text().trim()
                    )))
                }
                Err(e) => (Failure::Transient(e.to_string()), None),
            };

            if attempt >= self.retry.max_attempts {
                return Err(match failure {
                    Failure::RateLimited => ResolveError::RateLimited { attempts: attempt },
                    Failure::Transient(reason) => ResolveError::upstream(reason),
                });
            }

            let delay = self.retry.delay(attempt, floor);
            warn!(
                url = %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                rate_limited = matches!(failure, Failure::RateLimited),
                "retrying GitHub API call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ResolveError> {
        match self.get(url).await? {
            Some(resp) => serde_json::from_slice(&resp.body)
                .map(Some)
                .map_err(|e| ResolveError::upstream(format!("invalid response from {}: {}", url, e))),
            None => Ok(None),
        }
    }

    async fn verify_tag(&self, path: &ImportPath, tag: &str) -> Result<(), ResolveError> {
        let url = format!("{}/git/ref/tags/{}", self.repo_url(path), tag);
        match self.get(&url).await? {
            Some(_) => Ok(()),
            None => Err(ResolveError::not_found(format!(
                "tag {} of {}/{}",
                tag, path.owner, path.repo
            ))),
        }
    }

    /// All tag names, walking pages until a short page or the page cap
    async fn list_tags(&self, path: &ImportPath) -> Result<Vec<String>, ResolveError> {
        let mut names = Vec::new();

        for page in 1..=self.max_pages {
            let url = format!(
                "{}/tags?per_page={}&page={}",
                self.repo_url(path),
                self.page_size,
                page
            );

            let Some(batch) = self.get_json::<Vec<Tag>>(&url).await? else {
                if page == 1 {
                    return Err(ResolveError::not_found(format!(
                        "repository {}/{}",
                        path.owner, path.repo
                    )));
                }
                break;
            };

            let count = batch.len();
            names.extend(batch.into_iter().map(|t| t.name));
            if count < self.page_size as usize {
                break;
            }
        }

        debug!(package = %path, tags = names.len(), "listed tags");
        Ok(names)
    }

    async fn latest_release_tag(&self, path: &ImportPath) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/releases?per_page={}", self.repo_url(path), self.page_size);
        let releases = self
            .get_json::<Vec<Release>>(&url)
            .await?
            .unwrap_or_default();
        Ok(latest_release(&releases).map(|r| r.tag_name.clone()))
    }

    async fn default_branch_head(&self, path: &ImportPath) -> Result<String, ResolveError> {
        let repo_missing =
            || ResolveError::not_found(format!("repository {}/{}", path.owner, path.repo));

        let repo: Repository = self
            .get_json(&self.repo_url(path))
            .await?
            .ok_or_else(repo_missing)?;

        let url = format!("{}/commits/{}", self.repo_url(path), repo.default_branch);
        let commit: Commit = self.get_json(&url).await?.ok_or_else(repo_missing)?;

        debug!(package = %path, branch = %repo.default_branch, sha = %commit.sha, "using default branch head");
        Ok(commit.sha)
    }

    async fn resolve_latest(&self, path: &ImportPath) -> Result<String, ResolveError> {
        let tags = self.list_tags(path).await?;

        if tags.is_empty() {
            return self.default_branch_head(path).await;
        }
        if let Some(tag) = highest_tag(tags.iter().map(String::as_str), None) {
            return Ok(tag.to_string());
        }
        if let Some(tag) = self.latest_release_tag(path).await? {
            return Ok(tag);
        }
        // Tags exist but carry neither semver nor a release date
        Ok(tags[0].clone())
    }
}

#[async_trait]
impl Resolver for GitHubResolver {
    async fn resolve(
        &self,
        path: &ImportPath,
        constraint: &VersionConstraint,
    ) -> Result<ResolvedVersion, ResolveError> {
        let version = match constraint {
            VersionConstraint::Pinned(tag) => {
                self.verify_tag(path, tag).await?;
                tag.clone()
            }
            VersionConstraint::Latest => self.resolve_latest(path).await?,
            VersionConstraint::Range(req) => {
                let tags = self.list_tags(path).await?;
                highest_tag(tags.iter().map(String::as_str), Some(req))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ResolveError::not_found(format!(
                            "tag of {}/{} matching {}",
                            path.owner, path.repo, req
                        ))
                    })?
            }
        };

        debug!(package = %path, constraint = %constraint, version = %version, "resolved");
        Ok(ResolvedVersion {
            archive_url: self.archive_url(path, &version),
            version,
            resolved_at: Utc::now(),
        })
    }
}

enum Failure {
    RateLimited,
    Transient(String),
}

/// Primary limit (403 with no remaining quota), secondary limit (403 with
/// Retry-After), or plain 429
fn is_rate_limited(resp: &HttpResponse) -> bool {
    match resp.status {
        429 => true,
        403 => {
            resp.header("x-ratelimit-remaining").map(str::trim) == Some("0")
                || resp.header("retry-after").is_some()
        }
        _ => false,
    }
}

/// Server-requested wait from Retry-After or the rate-limit reset time
fn rate_limit_floor(resp: &HttpResponse) -> Option<Duration> {
    if let Some(secs) = resp
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }

    let reset = resp.header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let wait = reset - Utc::now().timestamp();
    (wait > 0).then(|| Duration::from_secs(wait as u64))
}
