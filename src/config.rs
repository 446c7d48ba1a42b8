use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the stock clip harvester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search scraping settings
    pub scraper: ScraperConfig,

    /// Authenticated session settings
    pub auth: AuthConfig,

    /// Where downloads, ignore lists and exports live
    pub storage: StorageConfig,

    /// Candidate filters applied before the ledger
    pub filters: FilterConfig,

    /// Embedding-based ranking settings
    pub ranking: RankingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Search endpoints, tried in order for each page
    pub search_urls: Vec<String>,

    /// Browser user agent sent with every request
    pub user_agent: String,

    /// Delay between consecutive page fetches and downloads (seconds)
    pub delay_seconds: f64,

    /// Hard cap on result pages scanned per run
    pub max_pages: u32,

    /// Stop after this many consecutive pages without a new candidate
    pub max_empty_pages: u32,

    /// Results requested per page
    pub page_size: u32,

    /// HTTP request timeout (seconds)
    pub request_timeout_seconds: u64,

    /// Download timeout (seconds)
    pub download_timeout_seconds: u64,

    /// Maximum retries for failed network requests
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Send stored session cookies with requests
    pub enabled: bool,

    /// File holding a raw `Cookie` header value
    pub cookie_file: Option<PathBuf>,

    /// Environment variable holding a raw `Cookie` header value
    pub cookie_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory; each query gets its own subdirectory
    pub download_dir: PathBuf,

    /// Directory of per-query exclusion lists
    pub ignore_list_dir: PathBuf,

    /// Directory of metadata-only JSON exports
    pub export_dir: PathBuf,

    /// Video file extensions recognised in download directories
    pub video_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    /// Reject clips longer than this (seconds)
    pub max_duration_seconds: Option<f64>,

    /// Reject clips shorter than this (seconds)
    pub min_duration_seconds: Option<f64>,

    /// Reject clips larger than this (megabytes)
    pub max_size_mb: Option<f64>,

    /// Reject clips whose title contains any of these (case-insensitive)
    pub exclude_title_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Base URL of the embedding server
    pub endpoint: String,

    /// Frames sampled per clip
    pub frames_per_clip: usize,

    /// Number of clips kept after ranking
    pub top_k: usize,

    /// Destination for ranked copies
    pub output_dir: PathBuf,

    /// Embedding request timeout (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset
    pub level: String,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("stock-scraper.toml"),
            PathBuf::from("config/stock-scraper.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(PathBuf::from(home).join(".config/stock-scraper/config.toml"));
        }

        for path in &config_paths {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Self::from_env()
    }

    /// Load configuration from a specific TOML file, then apply env overrides
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Failed to parse config {}: {}", path.display(), e))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("STOCK_SCRAPER_DOWNLOAD_DIR") {
            self.storage.download_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("STOCK_SCRAPER_IGNORE_LIST_DIR") {
            self.storage.ignore_list_dir = PathBuf::from(dir);
        }

        if let Ok(delay) = std::env::var("STOCK_SCRAPER_DELAY") {
            self.scraper.delay_seconds = delay.parse().unwrap_or(self.scraper.delay_seconds);
        }

        if let Ok(endpoint) = std::env::var("STOCK_SCRAPER_EMBEDDING_ENDPOINT") {
            self.ranking.endpoint = endpoint;
        }

        if let Ok(level) = std::env::var("STOCK_SCRAPER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scraper.search_urls.is_empty() {
            return Err(anyhow!("at least one search URL is required"));
        }

        if !self.scraper.delay_seconds.is_finite() || self.scraper.delay_seconds < 0.0 {
            return Err(anyhow!("delay_seconds must be a non-negative number"));
        }

        if self.scraper.max_pages == 0 {
            return Err(anyhow!("max_pages must be greater than 0"));
        }

        if let (Some(min), Some(max)) = (
            self.filters.min_duration_seconds,
            self.filters.max_duration_seconds,
        ) {
            if min > max {
                return Err(anyhow!(
                    "min_duration_seconds ({}) exceeds max_duration_seconds ({})",
                    min,
                    max
                ));
            }
        }

        if self.storage.video_extensions.is_empty() {
            return Err(anyhow!("video_extensions must not be empty"));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Delay between upstream calls
    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.scraper.delay_seconds.max(0.0))
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Stock Scraper Configuration:\n\
            - Download Directory: {}\n\
            - Ignore Lists: {}\n\
            - Delay: {:.1}s\n\
            - Max Pages: {}\n\
            - Authentication: {}\n\
            - Filters: duration {:?}..{:?}s, size <= {:?}MB, {} title patterns",
            self.storage.download_dir.display(),
            self.storage.ignore_list_dir.display(),
            self.scraper.delay_seconds,
            self.scraper.max_pages,
            self.auth.enabled,
            self.filters.min_duration_seconds,
            self.filters.max_duration_seconds,
            self.filters.max_size_mb,
            self.filters.exclude_title_patterns.len()
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig {
                search_urls: vec![
                    "https://stock.adobe.com/search/videos".to_string(),
                    "https://stock.adobe.com/search".to_string(),
                ],
                user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                delay_seconds: 1.0,
                max_pages: 10,
                max_empty_pages: 3,
                page_size: 200,
                request_timeout_seconds: 30,
                download_timeout_seconds: 60,
                max_retries: 3,
            },
            auth: AuthConfig {
                enabled: false,
                cookie_file: None,
                cookie_env: "STOCK_SCRAPER_COOKIE".to_string(),
            },
            storage: StorageConfig {
                download_dir: PathBuf::from("downloads"),
                ignore_list_dir: PathBuf::from("ignore_list"),
                export_dir: PathBuf::from("json_outputs"),
                video_extensions: vec![
                    "mp4".to_string(),
                    "mov".to_string(),
                    "webm".to_string(),
                    "avi".to_string(),
                    "mkv".to_string(),
                ],
            },
            filters: FilterConfig::default(),
            ranking: RankingConfig {
                endpoint: "http://localhost:8765".to_string(),
                frames_per_clip: 8,
                top_k: 5,
                output_dir: PathBuf::from("filtered"),
                timeout_seconds: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.download_dir = dir;
        self
    }

    pub fn with_ignore_list_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.ignore_list_dir = dir;
        self
    }

    pub fn with_export_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.export_dir = dir;
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.config.scraper.delay_seconds = seconds;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.config.scraper.max_pages = pages;
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.config.filters = filters;
        self
    }

    pub fn enable_auth(mut self, enable: bool) -> Self {
        self.config.auth.enabled = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scraper.max_pages, 10);
        assert_eq!(config.scraper.max_empty_pages, 3);
        assert!(!config.auth.enabled);
        assert_eq!(config.storage.download_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_delay(0.0)
            .with_max_pages(2)
            .enable_auth(true)
            .build();

        assert_eq!(config.scraper.delay_seconds, 0.0);
        assert_eq!(config.scraper.max_pages, 2);
        assert!(config.auth.enabled);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = ConfigBuilder::new()
            .with_filters(FilterConfig {
                min_duration_seconds: Some(30.0),
                max_duration_seconds: Some(10.0),
                ..Default::default()
            })
            .build();
        assert!(config.validate().is_err());

        let config = ConfigBuilder::new().with_max_pages(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scraper.search_urls, config.scraper.search_urls);
    }

    #[test]
    fn test_save_and_load_from() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("stock-scraper.toml");

        let config = ConfigBuilder::new().with_max_pages(7).build();
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.scraper.max_pages, 7);
        assert!(Config::load_from(&temp_dir.path().join("missing.toml")).is_err());
    }
}
