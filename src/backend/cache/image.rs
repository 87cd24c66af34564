use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::task::JoinHandle;

use super::{ComicCache, discard_file, path_exists, sanitize};
use crate::backend::storage::IMAGE_CACHE_INDEX;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCacheRecord {
    pub source_url: String,
    pub local_path: PathBuf,
    pub cache_key: String,
    pub cached_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Source URL → record.
pub type ImageIndex = HashMap<String, ImageCacheRecord>;

/// Where the host should load an image from right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Cached(PathBuf),
    Remote(String),
}

/// File name under `images/` for `url`. Distinct URLs that only differ in
/// punctuation share a key.
pub fn image_cache_key(url: &str) -> String {
    format!("{}.jpg", sanitize(url))
}

fn is_fetchable(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

impl ComicCache {
    pub fn image_path(&self, url: &str) -> PathBuf {
        self.images_dir().join(image_cache_key(url))
    }

    /// Returns the local path of `url`, downloading it first if needed.
    ///
    /// A file already present at the cache path is returned as-is without
    /// consulting the index. Download failures are logged and reported as
    /// `None` so the caller can fall back to the remote URL.
    pub async fn ensure_cached(&self, url: &str) -> Option<PathBuf> {
        if !is_fetchable(url) {
            return None;
        }

        let cache_key = image_cache_key(url);
        let path = self.images_dir().join(&cache_key);

        if path_exists(&path).await {
            return Some(path);
        }

        if let Err(e) = fs::create_dir_all(self.images_dir()).await {
            warn!("Failed to create image cache directory: {}", e);
            return None;
        }

        match self.remote().download_to_file(url, &path).await {
            Ok(status) if status.is_ok() => {}
            Ok(status) => {
                warn!("Not caching {}: HTTP {}", url, status.status_code);
                discard_file(&path).await;
                return None;
            }
            Err(e) => {
                warn!("Error caching image: {}", e);
                discard_file(&path).await;
                return None;
            }
        }

        let size_bytes = fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        let mut index: ImageIndex = self.load_index(IMAGE_CACHE_INDEX).await;
        index.insert(
            url.to_string(),
            ImageCacheRecord {
                source_url: url.to_string(),
                local_path: path.clone(),
                cache_key,
                cached_at: Utc::now(),
                size_bytes,
            },
        );
        self.save_index(IMAGE_CACHE_INDEX, &index).await;

        debug!("Cached {} ({} bytes)", url, size_bytes);
        Some(path)
    }

    /// Looks `url` up in the index. An entry whose file has vanished is
    /// dropped from the index and reported as a miss.
    pub async fn lookup_cached(&self, url: &str) -> Option<PathBuf> {
        if url.is_empty() {
            return None;
        }

        let mut index: ImageIndex = self.load_index(IMAGE_CACHE_INDEX).await;
        let record = index.get(url)?;

        if path_exists(&record.local_path).await {
            return Some(record.local_path.clone());
        }

        info!("Cached image for {} is gone, dropping index entry", url);
        index.remove(url);
        self.save_index(IMAGE_CACHE_INDEX, &index).await;
        None
    }

    /// Caches `url` on a detached task. The handle may be dropped.
    pub fn prefetch(&self, url: impl Into<String>) -> JoinHandle<()> {
        let cache = self.clone();
        let url = url.into();

        tokio::spawn(async move {
            if cache.ensure_cached(&url).await.is_none() {
                debug!("Background caching of {} did not complete", url);
            }
        })
    }

    /// Serves `url` from disk when indexed; otherwise hands back the remote
    /// URL and starts caching it in the background. A view rendered from the
    /// remote URL only picks up the cached copy on its next lookup.
    pub async fn resolve(&self, url: &str) -> ImageSource {
        if let Some(path) = self.lookup_cached(url).await {
            return ImageSource::Cached(path);
        }

        if is_fetchable(url) {
            self.prefetch(url);
        }
        ImageSource::Remote(url.to_string())
    }
}
