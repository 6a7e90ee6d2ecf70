//! Configuration management for Tankobon.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "tankobon";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Browser user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image download settings.
    pub download: DownloadConfig,

    /// Chapter and page discovery settings.
    pub discovery: DiscoveryConfig,

    /// Document composition settings.
    pub compose: ComposeConfig,

    /// File paths.
    pub paths: PathsConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Image download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Number of concurrent fetch slots per chapter.
    pub workers: usize,

    /// Attempts per image before giving up.
    pub attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Per-request timeout in seconds.
    pub timeout_sec: u64,

    /// A fetched image must be strictly larger than this many bytes.
    pub min_bytes: u64,

    /// User agent for all HTTP traffic.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            attempts: 3,
            retry_delay_ms: 2000,
            timeout_sec: 30,
            min_bytes: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DownloadConfig {
    /// Delay between two attempts of the same fetch.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Timeout applied to each HTTP call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

/// Which rendered-page accessor drives discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Headless Chromium, executes the site's JavaScript.
    Chromium,
    /// Plain HTTP fetch of the served markup.
    Html,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "chromium") {
            Backend::Chromium
        } else {
            Backend::Html
        }
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Accessor used to load pages.
    pub backend: Backend,

    /// Time allowed for the landing page to render, in milliseconds.
    pub chapter_settle_ms: u64,

    /// Time allowed for a chapter reader to render, in milliseconds.
    pub page_settle_ms: u64,

    /// Upper bound for a single navigation, in seconds.
    pub navigation_timeout_sec: u64,

    /// Explicit browser executable. Searched on PATH when unset.
    pub chromium_path: Option<PathBuf>,

    /// Run the browser without a window.
    pub headless: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            chapter_settle_ms: 3000,
            page_settle_ms: 5000,
            navigation_timeout_sec: 60,
            chromium_path: None,
            headless: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn chapter_settle(&self) -> Duration {
        Duration::from_millis(self.chapter_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_sec)
    }
}

/// Composition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// JPEG quality used when embedding pages (1-100).
    pub jpeg_quality: u8,

    /// Prepend the work's cover to every chapter document.
    pub include_cover: bool,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 95,
            include_cover: true,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory for downloaded works.
    pub output_directory: PathBuf,

    /// Directory searched for Netscape cookie files.
    /// Defaults to the config directory.
    pub cookie_directory: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("downloads"),
            cookie_directory: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable debug-level output.
    pub debug: bool,

    /// Also write the log to `tankobon.log` in the output directory.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            file: true,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "download.workers".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.download.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "download.attempts".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if !(1..=100).contains(&self.compose.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "compose.jpeg_quality".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the directory searched for cookie files.
    pub fn cookie_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.cookie_directory {
            Some(dir) => Ok(dir.clone()),
            None => Self::config_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.download.workers, 8);
        assert_eq!(config.download.attempts, 3);
        assert_eq!(config.download.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.download.min_bytes, 1000);
        assert_eq!(config.compose.jpeg_quality, 95);
        assert_eq!(config.paths.output_directory, PathBuf::from("downloads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.download.workers = 4;
        config.discovery.backend = Backend::Html;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.download.workers, 4);
        assert_eq!(loaded.discovery.backend, Backend::Html);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.download.workers, 8);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[download]\nworkers = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.download.workers, 2);
        assert_eq!(config.download.attempts, 3);
        assert_eq!(config.discovery.page_settle_ms, 5000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.download.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.download.attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.compose.jpeg_quality = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("compose.jpeg_quality"));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "download = [").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
