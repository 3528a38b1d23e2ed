//! Bootstrap configuration loading and default path resolution
//!
//! Bootstrap settings come from a small TOML file. Everything that can change
//! at runtime lives in the database `settings` table instead.
//!
//! Priority order for each bootstrap value:
//! 1. Command-line argument / environment variable (applied by the binary)
//! 2. TOML config file
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name used under the platform config/data dirs
pub const APP_DIR_NAME: &str = "dopa";

/// Default HTTP port for the tracker service
pub const DEFAULT_PORT: u16 = 5730;

/// Default ledger service base URL
pub const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:3001";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change while running.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ledger (settlement) service base URL
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,

    /// Semantic analyzer base URL (analyzer disabled when absent)
    #[serde(default)]
    pub analyzer_url: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            ledger_url: default_ledger_url(),
            analyzer_url: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_ledger_url() -> String {
    DEFAULT_LEDGER_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("dopa.db")
}

/// Get OS-dependent default data directory
///
/// Linux: ~/.local/share/dopa, macOS: ~/Library/Application Support/dopa,
/// Windows: %LOCALAPPDATA%\dopa
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./dopa_data"))
}

/// Get default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./dopa.toml"))
}

/// Parse TOML bootstrap configuration from a string
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
}

/// Load TOML bootstrap configuration
///
/// A missing file is not an error: a warning is logged and compiled defaults
/// are returned. A file that exists but cannot be parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_toml_config(&content)?;
    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}
