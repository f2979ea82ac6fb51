//! Application configuration management.
//!
//! Handles loading, saving, and validating zonewatch configuration:
//! - Region ceilings and small-zone expansion
//! - Event processing thresholds and platform variant
//! - Which location sources are enabled
//! - Diagnostic history size
//! - Host server settings
//!
//! Configuration is read from an optional TOML file and then overridden from
//! the environment, e.g. `ZONEWATCH__MONITORING__CIRCULAR_LIMIT=10`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Platform;
use crate::diagnostics::DEFAULT_CAPACITY;
use crate::region_filter::{RegionLimits, DEFAULT_BEACON_LIMIT, DEFAULT_CIRCULAR_LIMIT};
use crate::zone::RegionGeometry;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ZONEWATCH";

/// Separator between nested keys in environment overrides.
pub const ENV_SEPARATOR: &str = "__";

/// Errors loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write configuration to {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Sources could not be merged or deserialized.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// No platform configuration directory could be determined.
    #[error("Cannot determine configuration directory")]
    NoConfigDirectory,

    /// A single field is invalid.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("Configuration has {} problems", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonewatchConfig {
    /// Region ceilings and zone expansion.
    pub monitoring: MonitoringConfig,
    /// Event processing.
    pub processing: ProcessingConfig,
    /// Enabled location sources.
    pub location_sources: LocationSources,
    /// Diagnostic history.
    pub diagnostics: DiagnosticsConfig,
    /// Host server.
    pub server: ServerConfig,
}

/// Region ceilings and small-zone expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Maximum monitored beacon regions.
    pub beacon_limit: usize,
    /// Maximum monitored circular regions.
    pub circular_limit: usize,
    /// Zones smaller than this are covered by several circles this wide.
    pub minimum_radius_meters: f64,
    /// How many circles cover a small zone.
    pub sub_region_count: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let geometry = RegionGeometry::default();
        Self {
            beacon_limit: DEFAULT_BEACON_LIMIT,
            circular_limit: DEFAULT_CIRCULAR_LIMIT,
            minimum_radius_meters: geometry.minimum_radius,
            sub_region_count: geometry.sub_region_count,
        }
    }
}

impl MonitoringConfig {
    /// Per-kind region ceilings.
    #[must_use]
    pub const fn limits(&self) -> RegionLimits {
        RegionLimits {
            beacon: self.beacon_limit,
            circular: self.circular_limit,
        }
    }

    /// Zone expansion parameters.
    #[must_use]
    pub const fn geometry(&self) -> RegionGeometry {
        RegionGeometry {
            minimum_radius: self.minimum_radius_meters,
            sub_region_count: self.sub_region_count,
        }
    }
}

/// Event processing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Location batches older than this are ignored.
    pub stale_location_secs: u64,
    /// Upper bound on a one-shot location fetch.
    pub one_shot_timeout_secs: u64,
    /// How long each background window lasts.
    pub background_budget_secs: u64,
    /// Platform variant.
    pub platform: Platform,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            stale_location_secs: 30,
            one_shot_timeout_secs: 10,
            background_budget_secs: 25,
            platform: Platform::Standard,
        }
    }
}

impl ProcessingConfig {
    /// Staleness threshold for location batches.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_location_secs)
    }

    /// One-shot fetch timeout.
    #[must_use]
    pub const fn one_shot_timeout(&self) -> Duration {
        Duration::from_secs(self.one_shot_timeout_secs)
    }

    /// Background window length.
    #[must_use]
    pub const fn background_budget(&self) -> Duration {
        Duration::from_secs(self.background_budget_secs)
    }
}

/// Which location sources are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSources {
    /// Monitor zone regions.
    pub zone: bool,
    /// Monitor significant location changes.
    pub significant_location_change: bool,
}

impl Default for LocationSources {
    fn default() -> Self {
        Self {
            zone: true,
            significant_location_change: true,
        }
    }
}

/// Diagnostic history settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Entries kept before the oldest are evicted.
    pub capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Host server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// Webhook location updates are posted to.
    pub webhook_url: Option<String>,
    /// JSON file logging and compact output.
    pub production: bool,
    /// JSON list of zones to load at startup.
    pub zones_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".into(),
            webhook_url: None,
            production: false,
            zones_path: None,
        }
    }
}

impl ZonewatchConfig {
    /// Load configuration from `path` (if it exists) and the environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when loading fails.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to load configuration, using defaults");
            Self::default()
        })
    }

    /// Save configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single problem, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        check(self.monitoring.beacon_limit > 0, "monitoring.beacon_limit", "must be greater than 0");
        check(
            self.monitoring.circular_limit > 0,
            "monitoring.circular_limit",
            "must be greater than 0",
        );
        check(
            self.monitoring.minimum_radius_meters > 0.0,
            "monitoring.minimum_radius_meters",
            "must be greater than 0",
        );
        check(
            (2..=RegionGeometry::MAX_SUB_REGIONS).contains(&self.monitoring.sub_region_count),
            "monitoring.sub_region_count",
            "must be between 2 and 360",
        );
        check(
            self.processing.stale_location_secs > 0,
            "processing.stale_location_secs",
            "must be greater than 0",
        );
        check(
            self.processing.one_shot_timeout_secs > 0,
            "processing.one_shot_timeout_secs",
            "must be greater than 0",
        );
        check(self.diagnostics.capacity > 0, "diagnostics.capacity", "must be greater than 0");

        if let Some(webhook) = &self.server.webhook_url {
            check(is_valid_webhook_url(webhook), "server.webhook_url", "must be an http(s) URL");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Whether `value` is an absolute http or https URL.
#[must_use]
pub fn is_valid_webhook_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Default configuration file location for this platform.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDirectory`] if no home directory is known.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    directories::ProjectDirs::from("", "", "zonewatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .ok_or(ConfigError::NoConfigDirectory)
}
