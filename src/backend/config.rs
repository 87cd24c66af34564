use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://komiku-api.fly.dev/api";
const DEFAULT_USER_AGENT: &str = "YuKomi/0.1.0";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "YUKOMI_HOME";

/// Runtime configuration for the storage core and its HTTP client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub api_base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Builds the default configuration, honouring `YUKOMI_HOME` when set.
    pub fn from_env() -> Self {
        let data_dir = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self {
            data_dir,
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Root of the file-backed caches (`images/` and `chapters/`).
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Root of the key-value store.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yukomi")
}
