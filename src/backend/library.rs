use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;
use super::komiku::{ChapterRef, Comic};
use super::storage::{FAVORITES, KvStore, READER_PREFERENCES, READING_HISTORY};

const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteComic {
    #[serde(flatten)]
    pub comic: Comic,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub comic: Comic,
    pub last_read_chapter: ChapterRef,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderPreferences {
    pub theme: Theme,
    pub reading_mode: ReadingMode,
    pub auto_bookmark: bool,
    pub notifications: bool,
}

impl Default for ReaderPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            reading_mode: ReadingMode::Vertical,
            auto_bookmark: true,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderPreferencesUpdate {
    pub theme: Option<Theme>,
    pub reading_mode: Option<ReadingMode>,
    pub auto_bookmark: Option<bool>,
    pub notifications: Option<bool>,
}

/// Favourites, reading history and reader preferences.
///
/// Reads never fail: an unreadable value is logged and treated as empty.
#[derive(Debug, Clone)]
pub struct Library {
    store: KvStore,
}

impl Library {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn favorites(&self) -> Vec<FavoriteComic> {
        self.store.get_or_default(FAVORITES).await
    }

    /// Returns `false` when the comic was already a favourite.
    pub async fn add_favorite(&self, comic: &Comic) -> Result<bool> {
        let mut favorites = self.favorites().await;
        if favorites.iter().any(|f| f.comic.endpoint == comic.endpoint) {
            return Ok(false);
        }

        favorites.push(FavoriteComic {
            comic: comic.clone(),
            added_at: Utc::now(),
        });
        self.store.put(FAVORITES, &favorites).await?;
        Ok(true)
    }

    pub async fn remove_favorite(&self, endpoint: &str) -> Result<()> {
        let mut favorites = self.favorites().await;
        favorites.retain(|f| f.comic.endpoint != endpoint);
        self.store.put(FAVORITES, &favorites).await
    }

    pub async fn is_favorite(&self, endpoint: &str) -> bool {
        self.favorites()
            .await
            .iter()
            .any(|f| f.comic.endpoint == endpoint)
    }

    /// Most recently read first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.store.get_or_default(READING_HISTORY).await
    }

    /// Records `chapter` as the last one read. A comic already in the history
    /// keeps its position; a new one goes to the front.
    pub async fn record_read(&self, comic: &Comic, chapter: &ChapterRef) -> Result<()> {
        let mut history = self.history().await;
        let entry = HistoryEntry {
            comic: comic.clone(),
            last_read_chapter: chapter.clone(),
            last_read_at: Utc::now(),
        };

        match history
            .iter()
            .position(|h| h.comic.endpoint == comic.endpoint)
        {
            Some(i) => history[i] = entry,
            None => history.insert(0, entry),
        }
        history.truncate(MAX_HISTORY);

        self.store.put(READING_HISTORY, &history).await
    }

    pub async fn remove_history(&self, endpoint: &str) -> Result<()> {
        let mut history = self.history().await;
        history.retain(|h| h.comic.endpoint != endpoint);
        self.store.put(READING_HISTORY, &history).await
    }

    pub async fn last_read_chapter(&self, endpoint: &str) -> Option<ChapterRef> {
        self.history()
            .await
            .into_iter()
            .find(|h| h.comic.endpoint == endpoint)
            .map(|h| h.last_read_chapter)
    }

    pub async fn preferences(&self) -> ReaderPreferences {
        self.store.get_or_default(READER_PREFERENCES).await
    }

    pub async fn update_preferences(
        &self,
        update: &ReaderPreferencesUpdate,
    ) -> Result<ReaderPreferences> {
        let mut prefs = self.preferences().await;
        if let Some(theme) = update.theme {
            prefs.theme = theme;
        }
        if let Some(mode) = update.reading_mode {
            prefs.reading_mode = mode;
        }
        if let Some(v) = update.auto_bookmark {
            prefs.auto_bookmark = v;
        }
        if let Some(v) = update.notifications {
            prefs.notifications = v;
        }

        self.store.put(READER_PREFERENCES, &prefs).await?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::CacheError;
    use tempfile::TempDir;

    fn comic(n: usize) -> Comic {
        Comic {
            title: format!("Comic {}", n),
            endpoint: format!("/comic-{}/", n),
            thumbnail: None,
        }
    }

    fn chapter(n: usize) -> ChapterRef {
        ChapterRef {
            name: format!("Chapter {}", n),
            endpoint: format!("/chapter-{}/", n),
        }
    }

    #[tokio::test]
    async fn test_favorites_reject_duplicates() {
        let dir = TempDir::new().unwrap();
        let library = Library::new(KvStore::new(dir.path()));

        assert!(library.add_favorite(&comic(1)).await.unwrap());
        assert!(!library.add_favorite(&comic(1)).await.unwrap());
        assert!(library.is_favorite("/comic-1/").await);
        assert_eq!(library.favorites().await.len(), 1);

        library.remove_favorite("/comic-1/").await.unwrap();
        assert!(!library.is_favorite("/comic-1/").await);
    }

    #[tokio::test]
    async fn test_add_favorite_propagates_write_failure() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        std::fs::write(&root, b"").unwrap();
        let library = Library::new(KvStore::new(root));

        let result = library.add_favorite(&comic(1)).await;
        assert!(matches!(result, Err(CacheError::StorageWrite { .. })));
        assert!(!library.is_favorite("/comic-1/").await);
    }

    #[tokio::test]
    async fn test_history_is_capped_and_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let library = Library::new(KvStore::new(dir.path()));

        for n in 0..55 {
            library.record_read(&comic(n), &chapter(1)).await.unwrap();
        }

        let history = library.history().await;
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].comic.endpoint, "/comic-54/");
        assert!(library.last_read_chapter("/comic-0/").await.is_none());
    }

    #[tokio::test]
    async fn test_history_updates_existing_in_place() {
        let dir = TempDir::new().unwrap();
        let library = Library::new(KvStore::new(dir.path()));

        library.record_read(&comic(1), &chapter(1)).await.unwrap();
        library.record_read(&comic(2), &chapter(1)).await.unwrap();
        library.record_read(&comic(1), &chapter(7)).await.unwrap();

        let history = library.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].comic.endpoint, "/comic-2/");
        assert_eq!(
            library.last_read_chapter("/comic-1/").await,
            Some(chapter(7))
        );

        library.remove_history("/comic-2/").await.unwrap();
        assert_eq!(library.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_preferences_merge() {
        let dir = TempDir::new().unwrap();
        let library = Library::new(KvStore::new(dir.path()));
        assert_eq!(library.preferences().await, ReaderPreferences::default());

        let prefs = library
            .update_preferences(&ReaderPreferencesUpdate {
                theme: Some(Theme::Dark),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.reading_mode, ReadingMode::Vertical);
        assert!(prefs.notifications);
    }

    #[test]
    fn test_favorite_serializes_flat() {
        let fav = FavoriteComic {
            comic: comic(3),
            added_at: Utc::now(),
        };
        let value = serde_json::to_value(&fav).unwrap();
        assert_eq!(value["endpoint"], "/comic-3/");
        assert!(value.get("addedAt").is_some());
    }
}
