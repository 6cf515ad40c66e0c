//! Blocking HTTP client bridged onto the tokio runtime
//!
//! `ureq` is synchronous, so every call runs on the blocking pool. Status
//! codes are never turned into errors here; callers decide what a 404 or a
//! 429 means for them.

use std::time::Duration;
use thiserror::Error;
use ureq::http::HeaderMap;
use ureq::Agent;

/// Sent with every request
pub const USER_AGENT: &str = concat!("binsmith/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("HTTP worker failed: {0}")]
    Worker(String),
}

/// A fully read response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as a string, if present and valid
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared HTTP agent
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl HttpClient {
    /// Create a client whose requests are bounded by `timeout` end to end
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: Agent::new_with_config(config),
        }
    }

    /// GET `url`, reading at most `limit` bytes of body
    pub async fn get(
        &self,
        url: &str,
        headers: Vec<(&'static str, String)>,
        limit: u64,
    ) -> Result<HttpResponse, HttpError> {
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(&url).header("User-Agent", USER_AGENT);
            for (name, value) in headers {
                request = request.header(name, value);
            }

            let mut response = request
                .call()
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .body_mut()
                .with_config()
                .limit(limit)
                .read_to_vec()
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
        .await
        .map_err(|e| HttpError::Worker(e.to_string()))?
    }

    /// PUT `body` to `url`
    pub async fn put(
        &self,
        url: &str,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, HttpError> {
        let agent = self.agent.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.put(&url).header("User-Agent", USER_AGENT);
            for (name, value) in headers {
                request = request.header(name, value);
            }

            let mut response = request
                .send(&body[..])
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            // Error bodies only, keep them small
            let body = response
                .body_mut()
                .with_config()
                .limit(64 * 1024)
                .read_to_vec()
                .unwrap_or_default();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
        .await
        .map_err(|e| HttpError::Worker(e.to_string()))?
    }
}

/// Standard bearer authorization header, if a token is set
pub fn bearer(token: Option<&str>) -> Option<(&'static str, String)> {
    token.map(|t| ("Authorization", format!("Bearer {}", t)))
}
