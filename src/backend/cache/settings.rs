use serde::{Deserialize, Serialize};

use super::ComicCache;
use crate::backend::error::Result;
use crate::backend::storage::CACHE_SETTINGS;

const DEFAULT_MAX_IMAGE_CACHE_BYTES: u64 = 500 * 1024 * 1024;
const DEFAULT_MAX_CHAPTER_CACHE_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_EXPIRY_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Cache limits. The size quotas are stored and reported but no cleanup path
/// enforces them; only `cache_expiry_ms` drives the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    pub max_image_cache_size_bytes: u64,
    pub max_chapter_cache_size_bytes: u64,
    pub auto_cleanup: bool,
    pub cache_expiry_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_image_cache_size_bytes: DEFAULT_MAX_IMAGE_CACHE_BYTES,
            max_chapter_cache_size_bytes: DEFAULT_MAX_CHAPTER_CACHE_BYTES,
            auto_cleanup: true,
            cache_expiry_ms: DEFAULT_EXPIRY_MS,
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettingsUpdate {
    pub max_image_cache_size_bytes: Option<u64>,
    pub max_chapter_cache_size_bytes: Option<u64>,
    pub auto_cleanup: Option<bool>,
    pub cache_expiry_ms: Option<u64>,
}

impl CacheSettings {
    pub fn merge(mut self, update: &CacheSettingsUpdate) -> Self {
        if let Some(v) = update.max_image_cache_size_bytes {
            self.max_image_cache_size_bytes = v;
        }
        if let Some(v) = update.max_chapter_cache_size_bytes {
            self.max_chapter_cache_size_bytes = v;
        }
        if let Some(v) = update.auto_cleanup {
            self.auto_cleanup = v;
        }
        if let Some(v) = update.cache_expiry_ms {
            self.cache_expiry_ms = v;
        }
        self
    }

    pub fn cache_expiry(&self) -> chrono::Duration {
        i64::try_from(self.cache_expiry_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl ComicCache {
    pub async fn get_settings(&self) -> CacheSettings {
        self.store().get_or_default(CACHE_SETTINGS).await
    }

    pub async fn update_settings(&self, update: &CacheSettingsUpdate) -> Result<CacheSettings> {
        let settings = self.get_settings().await.merge(update);
        self.store().put(CACHE_SETTINGS, &settings).await?;
        Ok(settings)
    }
}
