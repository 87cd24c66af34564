use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use yukomi::backend::cache::{CacheSettingsUpdate, ComicCache};
use yukomi::backend::komiku::{ChapterRef, Comic, KomikuClient};
use yukomi::backend::library::{ReaderPreferencesUpdate, ReadingMode, Theme};
use yukomi::{AppConfig, KvStore, Library};

const MB: u64 = 1024 * 1024;
const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Parser)]
#[command(name = "yukomi", version, about = "Offline cache for the YuKomi comic reader")]
struct Cli {
    /// Data directory (defaults to $YUKOMI_HOME or the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the comic API
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the cache directories and run start-up cleanup
    Init,
    /// Cache an image and print its local path
    Image { url: String },
    /// Print the cached path of an image, if any
    Lookup { url: String },
    /// Download a chapter for offline reading
    Download {
        comic_endpoint: String,
        chapter_endpoint: String,
        #[arg(long)]
        comic_title: Option<String>,
        #[arg(long)]
        chapter_name: Option<String>,
    },
    /// Read a downloaded chapter: list its pages and record it in the history
    Chapter {
        comic_endpoint: String,
        chapter_endpoint: String,
        #[arg(long)]
        comic_title: Option<String>,
        #[arg(long)]
        chapter_name: Option<String>,
    },
    /// Show disk usage of the caches
    Usage,
    /// Delete cached data
    Clear {
        #[arg(value_enum, default_value_t = ClearTarget::All)]
        target: ClearTarget,
    },
    /// Remove expired and orphaned cache entries
    Sweep,
    /// Show or change cache settings
    Settings {
        #[arg(long)]
        auto_cleanup: Option<bool>,
        #[arg(long)]
        expiry_days: Option<u64>,
        #[arg(long)]
        max_image_mb: Option<u64>,
        #[arg(long)]
        max_chapter_mb: Option<u64>,
    },
    /// Manage favourite comics
    Favorites {
        #[command(subcommand)]
        action: Option<FavoriteAction>,
    },
    /// Show or prune the reading history
    History {
        /// Forget the comic with this endpoint
        #[arg(long)]
        remove: Option<String>,
    },
    /// Show or change reader preferences
    Preferences {
        #[arg(long, value_enum)]
        theme: Option<ThemeArg>,
        #[arg(long, value_enum)]
        reading_mode: Option<ReadingModeArg>,
        #[arg(long)]
        auto_bookmark: Option<bool>,
        #[arg(long)]
        notifications: Option<bool>,
    },
}

#[derive(Subcommand)]
enum FavoriteAction {
    Add {
        endpoint: String,
        #[arg(long)]
        title: Option<String>,
    },
    Remove {
        endpoint: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClearTarget {
    Images,
    Chapters,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReadingModeArg {
    Vertical,
    Horizontal,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

impl From<ReadingModeArg> for ReadingMode {
    fn from(arg: ReadingModeArg) -> Self {
        match arg {
            ReadingModeArg::Vertical => ReadingMode::Vertical,
            ReadingModeArg::Horizontal => ReadingMode::Horizontal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    info!("Using data directory {}", config.data_dir.display());

    let store = KvStore::new(config.store_dir());
    let remote = Arc::new(KomikuClient::new(&config)?);
    let cache = ComicCache::new(config.cache_dir(), store.clone(), remote);
    let library = Library::new(store);
    cache.initialize().await?;

    match cli.command {
        Command::Init => println!("Cache ready at {}", config.cache_dir().display()),
        Command::Image { url } => match cache.ensure_cached(&url).await {
            Some(path) => println!("{}", path.display()),
            None => println!("Could not cache {}", url),
        },
        Command::Lookup { url } => match cache.lookup_cached(&url).await {
            Some(path) => println!("{}", path.display()),
            None => println!("Not cached"),
        },
        Command::Download {
            comic_endpoint,
            chapter_endpoint,
            comic_title,
            chapter_name,
        } => {
            let comic = comic_ref(comic_endpoint, comic_title);
            let chapter = chapter_ref(chapter_endpoint, chapter_name);

            let stored = cache.download_chapter(&comic, &chapter).await?;
            println!(
                "Downloaded \"{}\" for offline reading ({}/{} pages)",
                chapter.name, stored.cached_count, stored.total_count
            );
        }
        Command::Chapter {
            comic_endpoint,
            chapter_endpoint,
            comic_title,
            chapter_name,
        } => {
            let comic = comic_ref(comic_endpoint, comic_title);
            let chapter = chapter_ref(chapter_endpoint, chapter_name);

            match cache
                .lookup_cached_chapter(&comic.endpoint, &chapter.endpoint)
                .await
            {
                Some(cached) => {
                    println!("{} (cached {})", cached.title, cached.cached_at);
                    for page in cached.pages {
                        println!("  {}", page.display());
                    }
                    library.record_read(&comic, &chapter).await?;
                }
                None => println!("Chapter is not available offline"),
            }
        }
        Command::Usage => {
            let usage = cache.compute_usage().await;
            println!("Images:   {}", format_size(usage.image_bytes));
            println!("Chapters: {}", format_size(usage.chapter_bytes));
            println!("Total:    {}", format_size(usage.total_bytes));
        }
        Command::Clear { target } => match target {
            ClearTarget::Images => cache.clear_images().await?,
            ClearTarget::Chapters => cache.clear_chapters().await?,
            ClearTarget::All => {
                let outcome = cache.clear_all().await;
                if let Err(e) = outcome.images {
                    eprintln!("Failed to clear images: {}", e);
                }
                if let Err(e) = outcome.chapters {
                    eprintln!("Failed to clear chapters: {}", e);
                }
            }
        },
        Command::Sweep => cache.sweep_expired().await?,
        Command::Settings {
            auto_cleanup,
            expiry_days,
            max_image_mb,
            max_chapter_mb,
        } => {
            let update = CacheSettingsUpdate {
                max_image_cache_size_bytes: scale(max_image_mb, MB, "--max-image-mb")?,
                max_chapter_cache_size_bytes: scale(max_chapter_mb, MB, "--max-chapter-mb")?,
                auto_cleanup,
                cache_expiry_ms: scale(expiry_days, DAY_MS, "--expiry-days")?,
            };
            let settings = cache.update_settings(&update).await?;

            println!("Auto cleanup:      {}", settings.auto_cleanup);
            println!(
                "Expiry:            {} days",
                settings.cache_expiry_ms / DAY_MS
            );
            println!(
                "Image quota:       {}",
                format_size(settings.max_image_cache_size_bytes)
            );
            println!(
                "Chapter quota:     {}",
                format_size(settings.max_chapter_cache_size_bytes)
            );
        }
        Command::Favorites { action } => {
            match action {
                Some(FavoriteAction::Add { endpoint, title }) => {
                    let comic = comic_ref(endpoint, title);
                    if !library.add_favorite(&comic).await? {
                        println!("{} is already a favourite", comic.title);
                    }
                }
                Some(FavoriteAction::Remove { endpoint }) => {
                    library.remove_favorite(&endpoint).await?
                }
                None => {}
            }
            for fav in library.favorites().await {
                println!("{} ({})", fav.comic.title, fav.comic.endpoint);
            }
        }
        Command::History { remove } => {
            if let Some(endpoint) = remove {
                library.remove_history(&endpoint).await?;
            }
            for entry in library.history().await {
                println!(
                    "{}: {} ({})",
                    entry.comic.title, entry.last_read_chapter.name, entry.last_read_at
                );
            }
        }
        Command::Preferences {
            theme,
            reading_mode,
            auto_bookmark,
            notifications,
        } => {
            let update = ReaderPreferencesUpdate {
                theme: theme.map(Theme::from),
                reading_mode: reading_mode.map(ReadingMode::from),
                auto_bookmark,
                notifications,
            };
            let prefs = library.update_preferences(&update).await?;

            println!("Theme:          {:?}", prefs.theme);
            println!("Reading mode:   {:?}", prefs.reading_mode);
            println!("Auto bookmark:  {}", prefs.auto_bookmark);
            println!("Notifications:  {}", prefs.notifications);
        }
    }

    Ok(())
}

fn comic_ref(endpoint: String, title: Option<String>) -> Comic {
    Comic {
        title: title.unwrap_or_else(|| endpoint.clone()),
        endpoint,
        thumbnail: None,
    }
}

fn chapter_ref(endpoint: String, name: Option<String>) -> ChapterRef {
    ChapterRef {
        name: name.unwrap_or_else(|| endpoint.clone()),
        endpoint,
    }
}

/// Converts a flag given in `unit`s to its stored base unit.
fn scale(value: Option<u64>, unit: u64, flag: &str) -> Result<Option<u64>, String> {
    value
        .map(|v| {
            v.checked_mul(unit)
                .ok_or_else(|| format!("{} value {} is too large", flag, v))
        })
        .transpose()
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(500 * MB), "500.00 MB");
    }

    #[test]
    fn test_scale_converts_units() {
        assert_eq!(scale(None, MB, "--max-image-mb"), Ok(None));
        assert_eq!(scale(Some(500), MB, "--max-image-mb"), Ok(Some(500 * MB)));
        assert_eq!(scale(Some(7), DAY_MS, "--expiry-days"), Ok(Some(7 * DAY_MS)));
    }

    #[test]
    fn test_scale_rejects_overflow() {
        let err = scale(Some(300_000_000_000), DAY_MS, "--expiry-days").unwrap_err();
        assert!(err.contains("--expiry-days"));
        assert!(scale(Some(20_000_000_000_000), MB, "--max-image-mb").is_err());
    }

    #[test]
    fn test_cli_parses_download() {
        let cli = Cli::try_parse_from([
            "yukomi",
            "download",
            "/one-piece/",
            "/one-piece-chapter-1/",
            "--chapter-name",
            "Chapter 1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Download { .. }));
    }

    #[test]
    fn test_cli_parses_library_mutations() {
        let cli = Cli::try_parse_from([
            "yukomi",
            "favorites",
            "add",
            "/one-piece/",
            "--title",
            "One Piece",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Favorites {
                action: Some(FavoriteAction::Add { .. })
            }
        ));

        let cli = Cli::try_parse_from(["yukomi", "preferences", "--theme", "dark"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Preferences {
                theme: Some(ThemeArg::Dark),
                ..
            }
        ));
    }
}
