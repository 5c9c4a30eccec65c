//! Configuration management.
//!
//! A single [`Config`] is loaded by the binary and handed to the source
//! client, the attachment cache and the extractor at construction time.
//! Values come from (lowest to highest priority) built-in defaults, an
//! optional TOML file, and `JGRANTS_*` environment variables, where nested
//! keys use `__` (e.g. `JGRANTS_API__TIMEOUT_SECONDS=60`).

mod file_config;

pub use file_config::{find_config_file, write_default_config, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Public jGrants API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.jgrants-portal.go.jp/exp/v1/public";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "JGRANTS";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Attachment cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Content extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// MCP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the cache root directory
    pub fn cache_root(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(default_cache_dir)
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the public API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Whole-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Attachment cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root; defaults to the platform data directory
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Download attachments as part of a detail request
    #[serde(default = "default_true")]
    pub download_on_detail: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            download_on_detail: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Default cache directory (`<data_dir>/jgrants-mcp/files`)
pub fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("jgrants-mcp").join("files"))
        .unwrap_or_else(|| PathBuf::from("./files"))
}

/// Content extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Converters to register (`pdf`, `docx`, `xlsx`, `pptx`)
    #[serde(default = "default_converters")]
    pub enabled_converters: Vec<String>,

    /// Optional cap on the returned text, in characters
    #[serde(default)]
    pub max_text_chars: Option<usize>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled_converters: default_converters(),
            max_text_chars: None,
        }
    }
}

fn default_converters() -> Vec<String> {
    ["pdf", "docx", "xlsx", "pptx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` for structured output, anything else for human-readable
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from an optional file plus the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_API_BASE);
        assert_eq!(config.api.timeout_seconds, 30);
        assert!(config.cache.download_on_detail);
        assert_eq!(config.extraction.enabled_converters.len(), 4);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_cache_root_override() {
        let mut config = Config::default();
        config.cache.directory = Some(PathBuf::from("/tmp/grants"));
        assert_eq!(config.cache_root(), PathBuf::from("/tmp/grants"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jgrants-mcp.toml");
        std::fs::write(
            &path,
            r#"
[api]
timeout_seconds = 5

[cache]
directory = "/srv/jgrants/files"
download_on_detail = false

[extraction]
enabled_converters = ["docx"]
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.api.timeout_seconds, 5);
        assert_eq!(config.api.base_url, DEFAULT_API_BASE);
        assert_eq!(config.cache_root(), PathBuf::from("/srv/jgrants/files"));
        assert!(!config.cache.download_on_detail);
        assert_eq!(config.extraction.enabled_converters, vec!["docx"]);
    }
}
