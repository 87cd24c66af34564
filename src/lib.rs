pub mod backend;

pub use backend::cache::ComicCache;
pub use backend::config::AppConfig;
pub use backend::error::{CacheError, Result};
pub use backend::library::Library;
pub use backend::storage::KvStore;
