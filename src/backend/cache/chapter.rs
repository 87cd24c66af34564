use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{ComicCache, discard_file, path_exists, sanitize};
use crate::backend::error::Result;
use crate::backend::komiku::{ChapterPayload, ChapterRef, Comic, get_chapter_detail};
use crate::backend::storage::CHAPTER_CACHE_INDEX;

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPage {
    pub original_url: String,
    pub local_path: PathBuf,
    pub page_number: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComicSummary {
    pub title: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub name: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterCacheRecord {
    pub cache_key: String,
    pub chapter_directory: PathBuf,
    pub metadata_path: PathBuf,
    /// Successfully downloaded pages only, in reading order.
    pub pages: Vec<ChapterPage>,
    pub cached_at: DateTime<Utc>,
    pub comic_summary: ComicSummary,
    pub chapter_summary: ChapterSummary,
}

/// `"<comicEndpoint>_<chapterEndpoint>"` → record.
pub type ChapterIndex = HashMap<String, ChapterCacheRecord>;

/// Contents of `metadata.json` inside a bundle directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMetadata {
    pub comic: Comic,
    pub chapter: ChapterRef,
    pub title: String,
    pub cached_at: DateTime<Utc>,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChapter {
    pub cache_key: String,
    pub cached_count: usize,
    pub total_count: usize,
}

impl StoredChapter {
    pub fn is_partial(&self) -> bool {
        self.cached_count < self.total_count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedChapter {
    pub title: String,
    pub pages: Vec<PathBuf>,
    pub cached_at: DateTime<Utc>,
}

/// Bundle directory name for a (comic, chapter) pair.
pub fn chapter_cache_key(comic_endpoint: &str, chapter_endpoint: &str) -> String {
    format!("{}_{}", sanitize(comic_endpoint), sanitize(chapter_endpoint))
}

fn index_key(comic_endpoint: &str, chapter_endpoint: &str) -> String {
    format!("{}_{}", comic_endpoint, chapter_endpoint)
}

async fn read_metadata(path: &Path) -> Option<ChapterMetadata> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!("Cannot read chapter metadata {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("Corrupt chapter metadata {}: {}", path.display(), e);
            None
        }
    }
}

impl ComicCache {
    /// Downloads every page of `payload` into the chapter's bundle.
    ///
    /// Pages that fail to download are skipped; the result reports how many
    /// made it. Only failing to create the bundle directory or its metadata
    /// file is an error.
    pub async fn store_chapter(
        &self,
        comic: &Comic,
        chapter: &ChapterRef,
        payload: &ChapterPayload,
    ) -> Result<StoredChapter> {
        let cache_key = chapter_cache_key(&comic.endpoint, &chapter.endpoint);
        let chapter_directory = self.chapters_dir().join(&cache_key);
        let metadata_path = chapter_directory.join(METADATA_FILE);
        let total_count = payload.pages.len();

        let metadata = ChapterMetadata {
            comic: comic.clone(),
            chapter: chapter.clone(),
            title: payload.title.clone(),
            cached_at: Utc::now(),
            image_count: total_count,
        };
        if let Err(e) = write_bundle_header(&chapter_directory, &metadata_path, &metadata).await {
            error!("Error caching chapter {}: {}", cache_key, e);
            return Err(e);
        }

        let mut pages = Vec::with_capacity(total_count);
        for (i, url) in payload.pages.iter().enumerate() {
            let page_number = i + 1;
            let local_path = chapter_directory.join(format!("page_{}.jpg", page_number));

            match self.remote().download_to_file(url, &local_path).await {
                Ok(status) if status.is_ok() => pages.push(ChapterPage {
                    original_url: url.clone(),
                    local_path,
                    page_number,
                }),
                Ok(status) => {
                    warn!(
                        "Skipping page {} of {}: HTTP {}",
                        page_number, cache_key, status.status_code
                    );
                    discard_file(&local_path).await;
                }
                Err(e) => {
                    warn!("Error caching page {} of {}: {}", page_number, cache_key, e);
                    discard_file(&local_path).await;
                }
            }
        }

        let cached_count = pages.len();
        let mut index: ChapterIndex = self.load_index(CHAPTER_CACHE_INDEX).await;
        index.insert(
            index_key(&comic.endpoint, &chapter.endpoint),
            ChapterCacheRecord {
                cache_key: cache_key.clone(),
                chapter_directory,
                metadata_path,
                pages,
                cached_at: Utc::now(),
                comic_summary: ComicSummary {
                    title: comic.title.clone(),
                    endpoint: comic.endpoint.clone(),
                },
                chapter_summary: ChapterSummary {
                    name: chapter.name.clone(),
                    endpoint: chapter.endpoint.clone(),
                },
            },
        );
        self.save_index(CHAPTER_CACHE_INDEX, &index).await;

        info!(
            "Cached chapter {} ({}/{} pages)",
            cache_key, cached_count, total_count
        );
        Ok(StoredChapter {
            cache_key,
            cached_count,
            total_count,
        })
    }

    /// Returns the cached pages of a chapter that are still on disk.
    ///
    /// A bundle with unreadable metadata or no surviving pages is pruned
    /// from the index and reported as a miss.
    pub async fn lookup_cached_chapter(
        &self,
        comic_endpoint: &str,
        chapter_endpoint: &str,
    ) -> Option<CachedChapter> {
        let key = index_key(comic_endpoint, chapter_endpoint);
        let mut index: ChapterIndex = self.load_index(CHAPTER_CACHE_INDEX).await;
        let record = index.get(&key)?;

        if let Some(metadata) = read_metadata(&record.metadata_path).await {
            let mut pages = Vec::with_capacity(record.pages.len());
            for page in &record.pages {
                if path_exists(&page.local_path).await {
                    pages.push(page.local_path.clone());
                }
            }

            if !pages.is_empty() {
                return Some(CachedChapter {
                    title: metadata.title,
                    pages,
                    cached_at: metadata.cached_at,
                });
            }
        }

        info!("Pruning unusable chapter bundle {}", record.cache_key);
        index.remove(&key);
        self.save_index(CHAPTER_CACHE_INDEX, &index).await;
        None
    }

    /// Fetches the chapter's page list from the API and stores the bundle.
    pub async fn download_chapter(
        &self,
        comic: &Comic,
        chapter: &ChapterRef,
    ) -> Result<StoredChapter> {
        let payload = get_chapter_detail(self.remote(), &chapter.endpoint).await?;
        self.store_chapter(comic, chapter, &payload).await
    }
}

async fn write_bundle_header(
    chapter_directory: &Path,
    metadata_path: &Path,
    metadata: &ChapterMetadata,
) -> Result<()> {
    fs::create_dir_all(chapter_directory).await?;
    let content = serde_json::to_vec(metadata)?;
    fs::write(metadata_path, content).await?;
    Ok(())
}
