//! Engine configuration using Figment
//!
//! Settings are layered, highest precedence last:
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. environment variables prefixed with `EMS_TS_`, using `__` between nested keys
//!
//! # Environment Variable Overrides
//!
//! ```text
//! EMS_TS_ENGINE__DEFAULT_TIMEZONE=Europe/Paris
//! EMS_TS_ENGINE__ASSOCIATION_RETRIES=5
//! EMS_TS_LOGGING__LEVEL=debug
//! EMS_TS_CODEC__CSV_DELIMITER=";"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ems_timeseries::config::Settings;
//!
//! let settings = Settings::load_from("config/ems_timeseries.toml")?;
//! println!("Default timezone: {}", settings.engine.default_timezone);
//! # Ok::<(), ems_timeseries::config::ConfigError>(())
//! ```

use chrono::Duration;
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Prefix of the environment variables read by [`Settings::load_from`].
pub const ENV_PREFIX: &str = "EMS_TS_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub completeness: CompletenessConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// IANA timezone used when a request does not name one
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Re-reads after a lost association-creation race
    #[serde(default = "default_association_retries")]
    pub association_retries: u32,
}

/// Completeness statistics settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessConfig {
    /// Expected sampling interval for timeseries without one of their own
    #[serde(default)]
    pub default_interval_secs: Option<u64>,
}

/// Text codec settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_association_retries() -> u32 {
    3
}

fn default_csv_delimiter() -> char {
    ','
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            association_retries: default_association_retries(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            csv_delimiter: default_csv_delimiter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from defaults and the environment only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Load configuration from a TOML file, then the environment.
    ///
    /// A missing file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - the default timezone is a known IANA name
    /// - log level is valid (trace, debug, info, warn, error)
    /// - association retries is at least 1
    /// - the CSV delimiter is a single ASCII character other than a quote or newline
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.engine.association_retries == 0 {
            return Err(ConfigError::ValidationError(
                "association_retries must be at least 1".to_string(),
            ));
        }

        let delimiter = self.codec.csv_delimiter;
        if !delimiter.is_ascii() || matches!(delimiter, '"' | '\n' | '\r') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid csv_delimiter {delimiter:?}"
            )));
        }

        Ok(())
    }

    /// The default timezone, parsed.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.engine.default_timezone.parse::<Tz>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "Invalid default_timezone '{}'",
                self.engine.default_timezone
            ))
        })
    }

    /// Completeness fallback interval, if configured.
    pub fn default_interval(&self) -> Option<Duration> {
        self.completeness
            .default_interval_secs
            .filter(|secs| *secs > 0)
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
    }

    /// The CSV delimiter as a byte. Only meaningful after [`Settings::validate`].
    pub fn csv_delimiter(&self) -> u8 {
        u8::try_from(u32::from(self.codec.csv_delimiter)).unwrap_or(b',')
    }
}
