//! Configuration for dopa-tracker
//!
//! Two tiers:
//! 1. **Bootstrap** (TOML file + CLI/env overrides): database path, port,
//!    service URLs, log level. Fixed for the life of the process.
//! 2. **Runtime** (database `settings` table): tick cadence, settlement
//!    threshold, analyzer cadence, ledger timeout. Missing values are
//!    initialized with built-in defaults and written back.

use crate::db::settings::{get_setting, set_setting};
use crate::error::Result;
use crate::settlement::TOKEN_UNIT;
use dopa_common::config::{load_toml_config, TomlConfig};
use dopa_common::time::millis_to_duration;
use sqlx::SqlitePool;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Command-line overrides (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub ledger_url: Option<String>,
    pub analyzer_url: Option<String>,
}

/// Resolved bootstrap configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub ledger_url: String,
    /// Analyzer disabled when None
    pub analyzer_url: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load the TOML file at `toml_path` and apply overrides
    ///
    /// A missing file falls back to defaults; a malformed one is an error.
    pub fn load(toml_path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = load_toml_config(toml_path)?;
        Ok(Self::resolve(toml_config, overrides))
    }

    /// Merge overrides over TOML values
    pub fn resolve(toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        let analyzer_url = overrides
            .analyzer_url
            .or(toml_config.analyzer_url)
            .filter(|url| !url.trim().is_empty());

        Self {
            database_path: overrides
                .database_path
                .unwrap_or(toml_config.database_path),
            port: overrides.port.unwrap_or(toml_config.port),
            ledger_url: overrides.ledger_url.unwrap_or(toml_config.ledger_url),
            analyzer_url,
            log_level: toml_config.logging.level,
        }
    }
}

/// Runtime settings loaded from the database
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Feature tick period
    pub tick_interval_ms: u64,
    /// Settlement deltas below this are ignored
    pub sync_threshold: f64,
    /// Minimum spacing between analyzer samples
    pub analyzer_interval_ms: u64,
    /// Per-request ledger (and analyzer) timeout
    pub ledger_timeout_ms: u64,
}

pub const TICK_INTERVAL_RANGE: (u64, u64) = (50, 5_000);
/// Below one token unit a delta rounds to nothing on the wire and never settles
pub const SYNC_THRESHOLD_RANGE: (f64, f64) = (TOKEN_UNIT, 1.0);
pub const ANALYZER_INTERVAL_RANGE: (u64, u64) = (250, 60_000);
pub const LEDGER_TIMEOUT_RANGE: (u64, u64) = (1_000, 120_000);

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            sync_threshold: 1e-6,
            analyzer_interval_ms: 1_000,
            ledger_timeout_ms: 15_000,
        }
    }
}

impl RuntimeSettings {
    /// Load runtime settings, writing defaults for anything missing
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            tick_interval_ms: load_clamped(
                pool,
                "tick_interval_ms",
                defaults.tick_interval_ms,
                TICK_INTERVAL_RANGE,
            )
            .await?,
            sync_threshold: load_clamped(
                pool,
                "sync_threshold",
                defaults.sync_threshold,
                SYNC_THRESHOLD_RANGE,
            )
            .await?,
            analyzer_interval_ms: load_clamped(
                pool,
                "analyzer_interval_ms",
                defaults.analyzer_interval_ms,
                ANALYZER_INTERVAL_RANGE,
            )
            .await?,
            ledger_timeout_ms: load_clamped(
                pool,
                "ledger_timeout_ms",
                defaults.ledger_timeout_ms,
                LEDGER_TIMEOUT_RANGE,
            )
            .await?,
        };

        info!(
            tick_ms = settings.tick_interval_ms,
            sync_threshold = settings.sync_threshold,
            analyzer_ms = settings.analyzer_interval_ms,
            ledger_timeout_ms = settings.ledger_timeout_ms,
            "Loaded runtime settings from database"
        );
        Ok(settings)
    }

    pub fn tick_interval(&self) -> Duration {
        millis_to_duration(self.tick_interval_ms)
    }

    pub fn analyzer_interval(&self) -> Duration {
        millis_to_duration(self.analyzer_interval_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        millis_to_duration(self.ledger_timeout_ms)
    }
}

/// Read one setting, falling back to (and storing) `default` when missing
/// or unparseable, then clamp into `range`
async fn load_clamped<T>(pool: &SqlitePool, key: &str, default: T, range: (T, T)) -> Result<T>
where
    T: FromStr + Display + PartialOrd + Copy,
{
    let value = match get_setting::<T>(pool, key).await {
        Ok(Some(value)) => value,
        Ok(None) => {
            info!("Setting '{}' not found in database, using default: {}", key, default);
            set_setting(pool, key, default).await?;
            default
        }
        Err(e) => {
            warn!("{}; resetting to default {}", e, default);
            set_setting(pool, key, default).await?;
            default
        }
    };

    // NaN is unordered even against itself
    if value.partial_cmp(&value).is_none() {
        warn!("Setting '{}' is not a number, using default {}", key, default);
        return Ok(default);
    }

    let (min, max) = range;
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };

    if clamped != value {
        warn!(
            "Setting '{}' value {} outside [{}, {}], using {}",
            key, value, min, max, clamped
        );
    }

    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::test_support::setup_test_db;

    #[tokio::test]
    async fn test_defaults_written_back() {
        let db = setup_test_db().await;
        let settings = RuntimeSettings::load(&db).await.unwrap();
        assert_eq!(settings, RuntimeSettings::default());

        let stored: Option<u64> = get_setting(&db, "tick_interval_ms").await.unwrap();
        assert_eq!(stored, Some(200));
        let stored: Option<f64> = get_setting(&db, "sync_threshold").await.unwrap();
        assert_eq!(stored, Some(1e-6));
    }

    #[tokio::test]
    async fn test_out_of_range_values_clamped() {
        let db = setup_test_db().await;
        set_setting(&db, "tick_interval_ms", 5u64).await.unwrap();
        set_setting(&db, "sync_threshold", 7.5f64).await.unwrap();
        set_setting(&db, "analyzer_interval_ms", 999_999u64).await.unwrap();

        let settings = RuntimeSettings::load(&db).await.unwrap();
        assert_eq!(settings.tick_interval_ms, 50);
        assert_eq!(settings.sync_threshold, 1.0);
        assert_eq!(settings.analyzer_interval_ms, 60_000);
    }

    #[tokio::test]
    async fn test_sync_threshold_floor_is_one_token_unit() {
        let db = setup_test_db().await;
        set_setting(&db, "sync_threshold", 1e-9f64).await.unwrap();

        let settings = RuntimeSettings::load(&db).await.unwrap();
        assert_eq!(settings.sync_threshold, TOKEN_UNIT);
        assert!(crate::settlement::round_to_token_units(settings.sync_threshold) > 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_value_reset_to_default() {
        let db = setup_test_db().await;
        set_setting(&db, "tick_interval_ms", "fast").await.unwrap();

        let settings = RuntimeSettings::load(&db).await.unwrap();
        assert_eq!(settings.tick_interval_ms, 200);

        let stored: Option<u64> = get_setting(&db, "tick_interval_ms").await.unwrap();
        assert_eq!(stored, Some(200));
    }

    #[test]
    fn test_overrides_take_priority() {
        let toml_config = TomlConfig {
            port: 6000,
            analyzer_url: Some("http://analyzer.local".to_string()),
            ..TomlConfig::default()
        };

        let config = Config::resolve(
            toml_config,
            ConfigOverrides {
                port: Some(7000),
                ledger_url: Some("http://ledger.local".to_string()),
                ..ConfigOverrides::default()
            },
        );

        assert_eq!(config.port, 7000);
        assert_eq!(config.ledger_url, "http://ledger.local");
        assert_eq!(config.analyzer_url.as_deref(), Some("http://analyzer.local"));
    }

    #[test]
    fn test_blank_analyzer_url_disables_analyzer() {
        let config = Config::resolve(
            TomlConfig::default(),
            ConfigOverrides {
                analyzer_url: Some(String::new()),
                ..ConfigOverrides::default()
            },
        );
        assert!(config.analyzer_url.is_none());
    }
}
