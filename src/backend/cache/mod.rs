//! On-disk image and chapter caches.

mod admin;
mod chapter;
mod image;
mod settings;

pub use admin::{CacheUsage, ClearOutcome};
pub use chapter::{
    CachedChapter, ChapterCacheRecord, ChapterIndex, ChapterMetadata, ChapterPage, ChapterSummary,
    ComicSummary, StoredChapter, chapter_cache_key,
};
pub use image::{ImageCacheRecord, ImageIndex, ImageSource, image_cache_key};
pub use settings::{CacheSettings, CacheSettingsUpdate};

use log::{error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::komiku::Remote;
use super::storage::KvStore;

/// Concurrent callers are not serialised; the last index write wins.
#[derive(Clone)]
pub struct ComicCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    images_dir: PathBuf,
    chapters_dir: PathBuf,
    store: KvStore,
    remote: Arc<dyn Remote>,
}

impl ComicCache {
    pub fn new(cache_root: impl Into<PathBuf>, store: KvStore, remote: Arc<dyn Remote>) -> Self {
        let cache_root = cache_root.into();

        Self {
            inner: Arc::new(CacheInner {
                images_dir: cache_root.join("images"),
                chapters_dir: cache_root.join("chapters"),
                store,
                remote,
            }),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.inner.images_dir
    }

    pub fn chapters_dir(&self) -> &Path {
        &self.inner.chapters_dir
    }

    pub fn store(&self) -> &KvStore {
        &self.inner.store
    }

    fn remote(&self) -> &dyn Remote {
        self.inner.remote.as_ref()
    }

    /// Loads an index, treating an unreadable one as empty.
    async fn load_index<T: DeserializeOwned>(&self, key: &str) -> HashMap<String, T> {
        self.inner.store.get_or_default(key).await
    }

    /// Persists an index. Failures are logged; the in-memory copy the caller
    /// holds is still returned to the host.
    async fn save_index<T: Serialize>(&self, key: &str, index: &HashMap<String, T>) {
        if let Err(e) = self.inner.store.put(key, index).await {
            error!("Failed to update {}: {}", key, e);
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9]` with `_`.
pub(crate) fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Removes a file left behind by a failed download.
async fn discard_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
