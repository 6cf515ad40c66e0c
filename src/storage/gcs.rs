//! Google Cloud Storage backend (XML API, simple uploads)

use crate::artifact::{Artifact, CacheKey};
use crate::config::schema::StorageConfig;
use crate::error::StorageError;
use crate::http::{bearer, HttpClient};
use crate::storage::{object_name, Storage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Upload and download timeout
const OBJECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Artifacts stored as objects in a bucket
pub struct GcsStorage {
    http: HttpClient,
    endpoint: String,
    bucket: String,
    prefix: String,
    token: Option<String>,
    max_object_bytes: u64,
}

impl GcsStorage {
    pub fn new(config: &StorageConfig, bucket: String) -> Self {
        Self {
            http: HttpClient::new(OBJECT_TIMEOUT),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket,
            prefix: config.prefix.clone(),
            token: config.token.clone(),
            max_object_bytes: config.max_object_bytes(),
        }
    }

    fn object_url(&self, key: &CacheKey) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket,
            object_name(&self.prefix, key)
        )
    }
}

#[async_trait]
impl Storage for GcsStorage {
    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, StorageError> {
        let url = self.object_url(key);
        let headers = bearer(self.token.as_deref()).into_iter().collect();

        let resp = self
            .http
            .get(&url, headers, self.max_object_bytes)
            .await
            .map_err(|e| StorageError::unavailable(e.to_string()))?;

        match resp.status {
            404 => Ok(None),
            status if resp.is_success() => {
                let created_at = resp
                    .header("last-modified")
                    .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                debug!(url = %url, status, size = resp.body.len(), "fetched object");
                Ok(Some(Artifact::with_created_at(
                    key.clone(),
                    resp.body,
                    created_at,
                )))
            }
            status => Err(StorageError::unavailable(format!(
                "GET {} returned HTTP {}",
                url, status
            ))),
        }
    }

    async fn put(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let url = self.object_url(&artifact.key);
        let mut headers = vec![("Content-Type", "application/octet-stream".to_string())];
        headers.extend(bearer(self.token.as_deref()));

        let resp = self
            .http
            .put(&url, headers, artifact.bytes.clone())
            .await
            .map_err(|e| StorageError::write_failed(&url, e.to_string()))?;

        if !resp.is_success() {
            return Err(StorageError::write_failed(
                &url,
                format!("HTTP {}: {}", resp.status, resp.text().trim()),
            ));
        }

        debug!(url = %url, size = artifact.size, "uploaded object");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}
