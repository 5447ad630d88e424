//! Off-chain provider metadata fetch.
//!
//! Providers advertise a URI pointing at a JSON descriptor document
//! (location, rate-limit tiers, endpoints). The fetch has a bounded retry
//! count and a response-size cap; any failure is handled by the caller, not
//! fatal to it.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::IndexError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Source of provider metadata documents. Trait seam so tests can script
/// responses without a network.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<serde_json::Value, IndexError>;
}

/// HTTP metadata fetcher.
pub struct HttpMetadataFetcher {
    http: reqwest::Client,
    retries: u32,
    max_bytes: usize,
}

impl HttpMetadataFetcher {
    pub fn new(retries: u32, max_bytes: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, retries, max_bytes }
    }

    async fn fetch_once(&self, uri: &str) -> Result<serde_json::Value, IndexError> {
        let resp = self
            .http
            .get(uri)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| IndexError::Metadata(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IndexError::Metadata(format!("HTTP {}", resp.status().as_u16())));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| IndexError::Metadata(e.to_string()))?;
        if body.len() > self.max_bytes {
            return Err(IndexError::Metadata(format!(
                "document of {} bytes exceeds cap of {}",
                body.len(),
                self.max_bytes
            )));
        }

        serde_json::from_slice(&body).map_err(|e| IndexError::Metadata(e.to_string()))
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Result<serde_json::Value, IndexError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(uri).await {
                Ok(doc) => return Ok(doc),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(uri, attempt, error = %e, "metadata fetch failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
