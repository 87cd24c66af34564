//! In-memory [`Remote`] used by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::error::{CacheError, Result};
use super::komiku::{DownloadStatus, Remote};

#[derive(Default)]
pub struct FakeRemote {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    statuses: Mutex<HashMap<String, u16>>,
    broken: Mutex<Vec<String>>,
    json: Mutex<HashMap<String, serde_json::Value>>,
    downloads: Mutex<HashMap<String, usize>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    pub fn respond_with(&self, url: &str, status_code: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(url.to_string(), status_code);
    }

    /// Makes downloads of `url` fail with a transport error.
    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().push(url.to_string());
    }

    pub fn set_json(&self, endpoint: &str, value: serde_json::Value) {
        self.json
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), value);
    }

    pub fn download_count(&self, url: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<DownloadStatus> {
        *self
            .downloads
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        if self.broken.lock().unwrap().iter().any(|u| u == url) {
            return Err(CacheError::Download {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            });
        }

        if let Some(status_code) = self.statuses.lock().unwrap().get(url).copied() {
            return Ok(DownloadStatus { status_code });
        }

        let body = self.bodies.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => {
                tokio::fs::write(dest, body).await?;
                Ok(DownloadStatus { status_code: 200 })
            }
            None => Ok(DownloadStatus { status_code: 404 }),
        }
    }

    async fn fetch_json(&self, endpoint: &str) -> Result<serde_json::Value> {
        self.json
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| CacheError::Api {
                endpoint: endpoint.to_string(),
                reason: "HTTP 404".to_string(),
            })
    }
}
