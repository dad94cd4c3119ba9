use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_HTTP_PORT: &str = "9000";
pub const DEFAULT_FETCH_LIMIT: u32 = 2;

const APP_DIR: &str = "filetrack";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory whose files are tracked (letters, digits, `/`, `_`, `-`)
    #[serde(default)]
    pub directory: String,

    /// Seconds between change checks
    #[serde(default)]
    pub check_frequency: u64,

    /// Where change reports are published
    #[serde(default)]
    pub reporting_api: String,

    /// Port of the local logs API
    #[serde(default = "default_http_port")]
    pub http_port: String,

    /// Number of entries the UI asks for when fetching logs
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Log store file (defaults to the data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

fn default_http_port() -> String {
    DEFAULT_HTTP_PORT.to_string()
}

fn default_fetch_limit() -> u32 {
    DEFAULT_FETCH_LIMIT
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            check_frequency: 0,
            reporting_api: String::new(),
            http_port: default_http_port(),
            fetch_limit: default_fetch_limit(),
            store_path: None,
        }
    }
}

impl AppConfig {
    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join(APP_DIR);

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Directory for runtime data (log store, trace log)
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    /// Load and validate the config at `path`, or at the default location
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but falls back to defaults so the UI can still come up
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default config: {}", e);
                AppConfig::default()
            }
        }
    }

    /// Save config to `path`, or to the default location
    pub fn save(&self, path: Option<&Path>) -> Result<(), ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(ConfigError::Write)?;
        Ok(())
    }

    /// Sanitize and check every field
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let sanitized = self.directory.replace('\'', "''");
        if !is_valid_directory(&sanitized) {
            return Err(ConfigError::InvalidDirectory);
        }
        self.directory = sanitized;

        if self.check_frequency < 1 {
            return Err(ConfigError::invalid("check_frequency", "must be at least 1"));
        }

        if self.reporting_api.trim().is_empty() {
            return Err(ConfigError::invalid("reporting_api", "is required"));
        }
        match reqwest::Url::parse(&self.reporting_api) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::invalid(
                    "reporting_api",
                    format!("has unsupported scheme {}", url.scheme()),
                ))
            }
            Err(e) => return Err(ConfigError::invalid("reporting_api", format!("is not a url: {}", e))),
        }

        if self.http_port.trim().is_empty() {
            return Err(ConfigError::invalid("http_port", "is required"));
        }
        if self.http_port.parse::<u16>().is_err() {
            return Err(ConfigError::invalid("http_port", "is not a valid port"));
        }

        if self.fetch_limit < 1 {
            return Err(ConfigError::invalid("fetch_limit", "must be at least 1"));
        }

        Ok(())
    }

    /// Address the logs API binds to (loopback only)
    pub fn http_addr(&self) -> SocketAddr {
        let port = self.http_port.parse::<u16>().unwrap_or(9000);
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    /// Base URL the UI uses to reach the logs API
    pub fn api_base_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }

    /// Resolved log store location
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("logs.jsonl"))
    }
}

fn is_valid_directory(dir: &str) -> bool {
    !dir.is_empty()
        && dir
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-'))
}
