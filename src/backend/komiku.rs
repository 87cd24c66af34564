use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::config::AppConfig;
use super::error::{CacheError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub title: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub name: String,
    pub endpoint: String,
}

/// Page list of a single chapter as served by `/comic/chapter<endpoint>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPayload {
    pub title: String,
    #[serde(rename = "image", default)]
    pub pages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterDetailResponse {
    #[serde(default)]
    success: bool,
    data: Option<ChapterPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStatus {
    pub status_code: u16,
}

impl DownloadStatus {
    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }
}

/// Network capability consumed by the caches.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Downloads `url` into `dest`. The body is only written for a 200
    /// response; any other status is reported without touching `dest`.
    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<DownloadStatus>;

    async fn fetch_json(&self, endpoint: &str) -> Result<serde_json::Value>;
}

/// HTTP client for the Komiku comic API.
#[derive(Debug, Clone)]
pub struct KomikuClient {
    client: reqwest::Client,
    base_url: String,
}

impl KomikuClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CacheError::Api {
                endpoint: config.api_base_url.clone(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Remote for KomikuClient {
    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<DownloadStatus> {
        let download_err = |reason: String| CacheError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let status = DownloadStatus {
            status_code: response.status().as_u16(),
        };
        if !status.is_ok() {
            warn!("Download of {} returned HTTP {}", url, status.status_code);
            return Ok(status);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut body = response.bytes_stream();
        let mut written = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(dest).await;
                    return Err(download_err(e.to_string()));
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
        Ok(status)
    }

    async fn fetch_json(&self, endpoint: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let api_err = |reason: String| CacheError::Api {
            endpoint: endpoint.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| api_err(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| api_err(e.to_string()))
    }
}

/// Fetches the page list of a chapter.
pub async fn get_chapter_detail(
    remote: &dyn Remote,
    chapter_endpoint: &str,
) -> Result<ChapterPayload> {
    let endpoint = format!("/comic/chapter{}", chapter_endpoint);
    let value = remote.fetch_json(&endpoint).await?;
    let response: ChapterDetailResponse = serde_json::from_value(value)?;

    match response.data {
        Some(payload) if response.success => Ok(payload),
        _ => Err(CacheError::Api {
            endpoint,
            reason: "chapter detail request was not successful".to_string(),
        }),
    }
}
