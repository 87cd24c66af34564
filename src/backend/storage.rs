use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use super::error::{CacheError, Result};

pub const IMAGE_CACHE_INDEX: &str = "@YuKomi:image_cache_index";
pub const CHAPTER_CACHE_INDEX: &str = "@YuKomi:chapter_cache_index";
pub const CACHE_SETTINGS: &str = "@YuKomi:cache_settings";
pub const FAVORITES: &str = "@YuKomi:favorites";
pub const READING_HISTORY: &str = "@YuKomi:reading_history";
pub const READER_PREFERENCES: &str = "@YuKomi:settings";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct KvStore {
    root: PathBuf,
}

impl KvStore {
    /// Opens a store rooted at `root`. Nothing touches the disk until the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", urlencoding::encode(key)))
    }

    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let write_err = |reason: String| CacheError::StorageWrite {
            key: key.to_string(),
            reason,
        };

        let content = serde_json::to_vec(value).map_err(|e| write_err(e.to_string()))?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| write_err(e.to_string()))?;

        let path = self.path_for(key);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.tmp", seq));

        // Written beside the target and renamed, so readers never see half a value.
        let written = match fs::write(&tmp, &content).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(write_err(e.to_string()));
        }

        debug!("Stored {} ({} bytes)", key, content.len());
        Ok(())
    }

    /// Returns `Ok(None)` when the key was never written.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let read_err = |reason: String| CacheError::StorageRead {
            key: key.to_string(),
            reason,
        };

        let content = match fs::read(self.path_for(key)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(read_err(e.to_string())),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| read_err(e.to_string()))
    }

    /// Like [`KvStore::get`], but logs failures and falls back to the
    /// default value.
    pub async fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!("{}; using defaults", e);
                T::default()
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::StorageWrite {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_absent_key() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path().join("store"));

        let value: Option<Vec<String>> = store.get("@YuKomi:missing").await.unwrap();
        assert!(value.is_none());
        assert!(!store.root().exists(), "reads must not create the store");
    }

    #[tokio::test]
    async fn test_put_then_get_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());

        let mut map = HashMap::new();
        map.insert("a".to_string(), 1u32);
        store.put(IMAGE_CACHE_INDEX, &map).await.unwrap();

        map.insert("b".to_string(), 2);
        store.put(IMAGE_CACHE_INDEX, &map).await.unwrap();

        let read: HashMap<String, u32> = store.get(IMAGE_CACHE_INDEX).await.unwrap().unwrap();
        assert_eq!(read, map);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_read_error() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        std::fs::write(store.path_for(CACHE_SETTINGS), b"{not json").unwrap();

        let result: Result<Option<serde_json::Value>> = store.get(CACHE_SETTINGS).await;
        assert!(matches!(result, Err(CacheError::StorageRead { .. })));

        let fallback: HashMap<String, u32> = store.get_or_default(CACHE_SETTINGS).await;
        assert!(fallback.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_noop_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());

        store.remove(FAVORITES).await.unwrap();

        store.put(FAVORITES, &vec!["x"]).await.unwrap();
        store.remove(FAVORITES).await.unwrap();
        let value: Option<Vec<String>> = store.get(FAVORITES).await.unwrap();
        assert!(value.is_none());
    }

    fn store_entries(store: &KvStore) -> Vec<String> {
        std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path().join("store"));
        // A non-empty directory at the target path makes the rename fail.
        std::fs::create_dir_all(store.path_for(FAVORITES).join("blocker")).unwrap();

        for _ in 0..3 {
            let result = store.put(FAVORITES, &vec!["x"]).await;
            assert!(matches!(result, Err(CacheError::StorageWrite { .. })));
        }

        let entries = store_entries(&store);
        assert_eq!(entries.len(), 1, "unexpected entries: {:?}", entries);
        assert!(!entries[0].ends_with(".tmp"));
    }

    #[tokio::test]
    async fn test_put_fails_when_root_is_a_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        std::fs::write(&root, b"").unwrap();
        let store = KvStore::new(root.clone());

        let result = store.put(CACHE_SETTINGS, &1u32).await;
        assert!(matches!(result, Err(CacheError::StorageWrite { .. })));
    }

    #[tokio::test]
    async fn test_remove_of_directory_is_write_error() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path());
        std::fs::create_dir_all(store.path_for(FAVORITES)).unwrap();

        let result = store.remove(FAVORITES).await;
        assert!(matches!(result, Err(CacheError::StorageWrite { .. })));
    }

    #[test]
    fn test_keys_map_to_safe_file_names() {
        let store = KvStore::new("/data");
        let path = store.path_for("@YuKomi:image_cache_index");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains(':'));
        assert!(name.ends_with(".json"));
    }
}
