use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{ChapterIndex, ComicCache, ImageIndex, path_exists};
use crate::backend::error::Result;
use crate::backend::storage::{CHAPTER_CACHE_INDEX, IMAGE_CACHE_INDEX};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub total_bytes: u64,
    pub image_bytes: u64,
    pub chapter_bytes: u64,
}

/// Result of [`ComicCache::clear_all`], one entry per half.
#[derive(Debug)]
pub struct ClearOutcome {
    pub images: Result<()>,
    pub chapters: Result<()>,
}

impl ClearOutcome {
    pub fn is_success(&self) -> bool {
        self.images.is_ok() && self.chapters.is_ok()
    }
}

/// Total size of all files below `root`. A missing directory is empty.
async fn dir_size(root: &Path) -> u64 {
    let mut total = 0;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Cannot list {}: {}", dir.display(), e);
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while listing {}: {}", dir.display(), e);
                    break;
                }
            };
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(entry.path()),
                Ok(meta) => total += meta.len(),
                Err(e) => warn!("Cannot stat {}: {}", entry.path().display(), e),
            }
        }
    }

    total
}

async fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dir).await?;
    Ok(())
}

async fn remove_quietly(path: &Path, is_dir: bool) {
    let result = if is_dir {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    if let Err(e) = result {
        if e.kind() != ErrorKind::NotFound {
            error!("Error deleting expired {}: {}", path.display(), e);
        }
    }
}

impl ComicCache {
    /// Creates the cache directories and, when `auto_cleanup` is enabled,
    /// sweeps expired entries. Safe to call on every start.
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(self.images_dir()).await?;
        fs::create_dir_all(self.chapters_dir()).await?;
        info!("Cache directories initialized");

        if self.get_settings().await.auto_cleanup {
            if let Err(e) = self.sweep_expired().await {
                warn!("Start-up cleanup failed: {}", e);
            }
        }
        Ok(())
    }

    pub async fn compute_usage(&self) -> CacheUsage {
        let image_bytes = dir_size(self.images_dir()).await;
        let chapter_bytes = dir_size(self.chapters_dir()).await;

        CacheUsage {
            total_bytes: image_bytes + chapter_bytes,
            image_bytes,
            chapter_bytes,
        }
    }

    pub async fn clear_images(&self) -> Result<()> {
        reset_dir(self.images_dir()).await?;
        self.store()
            .put(IMAGE_CACHE_INDEX, &ImageIndex::new())
            .await
    }

    pub async fn clear_chapters(&self) -> Result<()> {
        reset_dir(self.chapters_dir()).await?;
        self.store()
            .put(CHAPTER_CACHE_INDEX, &ChapterIndex::new())
            .await
    }

    pub async fn clear_all(&self) -> ClearOutcome {
        let outcome = ClearOutcome {
            images: self.clear_images().await,
            chapters: self.clear_chapters().await,
        };

        if let Err(e) = &outcome.images {
            error!("Error clearing image cache: {}", e);
        }
        if let Err(e) = &outcome.chapters {
            error!("Error clearing chapter cache: {}", e);
        }
        outcome
    }

    /// Drops every record that is past the expiry window or whose backing
    /// data has disappeared, deleting the data of expired ones.
    pub async fn sweep_expired(&self) -> Result<()> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<()> {
        let expiry = self.get_settings().await.cache_expiry();

        let images: ImageIndex = self.load_index(IMAGE_CACHE_INDEX).await;
        let before = images.len();
        let mut kept_images = ImageIndex::with_capacity(before);
        for (url, record) in images {
            if now - record.cached_at < expiry && path_exists(&record.local_path).await {
                kept_images.insert(url, record);
            } else {
                remove_quietly(&record.local_path, false).await;
            }
        }
        let dropped_images = before - kept_images.len();
        self.store().put(IMAGE_CACHE_INDEX, &kept_images).await?;

        let chapters: ChapterIndex = self.load_index(CHAPTER_CACHE_INDEX).await;
        let before = chapters.len();
        let mut kept_chapters = ChapterIndex::with_capacity(before);
        for (key, record) in chapters {
            if now - record.cached_at < expiry && path_exists(&record.chapter_directory).await {
                kept_chapters.insert(key, record);
            } else {
                remove_quietly(&record.chapter_directory, true).await;
            }
        }
        let dropped_chapters = before - kept_chapters.len();
        self.store().put(CHAPTER_CACHE_INDEX, &kept_chapters).await?;

        info!(
            "Cache sweep dropped {} image(s) and {} chapter(s)",
            dropped_images, dropped_chapters
        );
        Ok(())
    }
}
