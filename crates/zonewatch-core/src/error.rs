//! Unified error types for the zonewatch core library.
//!
//! Event processing has two disjoint outcomes besides success:
//!
//! - [`IgnoreReason`]: the event carried no actionable work. Expected, logged,
//!   never retried and never surfaced as a failure.
//! - [`ZonewatchError`]: something actually went wrong (monitoring service,
//!   zone store write, submission). Logged with the event and dropped; the
//!   next qualifying callback is what triggers another attempt.
//!
//! [`ProcessError`] carries one or the other out of
//! [`EventProcessor::perform`](crate::processor::EventProcessor::perform).
//! Each module also keeps its own error enum (`MonitorError`, `ZoneStoreError`,
//! `SubmitError`, `LocatorError`, `ConfigError`) which converts into
//! [`ZonewatchError`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::services::{LocatorError, MonitorError, SubmitError};
use crate::store::{ZoneFileError, ZoneStoreError};

/// The unified error type for all zonewatch operations.
#[derive(Debug, Error)]
pub enum ZonewatchError {
    // =========================================================================
    // REGION MONITORING ERRORS
    // =========================================================================
    /// The monitoring service reported an error.
    #[error("Region monitoring error: {0}")]
    Monitoring(String),

    /// The monitoring service could not monitor a region.
    #[error("Monitoring failed for region '{identifier}': {message}")]
    MonitoringFailed {
        /// Region identifier.
        identifier: String,
        /// Reason reported by the service.
        message: String,
    },

    // =========================================================================
    // ZONE ERRORS
    // =========================================================================
    /// No zone with this identifier exists.
    #[error("Zone not found: '{0}'")]
    ZoneNotFound(String),

    /// Writing zone state failed.
    #[error("Zone store write failed: {0}")]
    ZoneWriteFailed(String),

    // =========================================================================
    // LOCATION & SUBMISSION ERRORS
    // =========================================================================
    /// No location fix could be obtained, not even a cached one.
    #[error("No location available: {0}")]
    LocationUnavailable(String),

    /// Submitting the location update failed.
    #[error("Location submission failed: {0}")]
    SubmissionFailed(String),

    /// No server is configured to submit to.
    #[error("No server configured. Set server.webhook_url or ZONEWATCH__SERVER__WEBHOOK_URL.")]
    ServerNotConfigured,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration could not be read or parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for zonewatch operations.
pub type Result<T> = std::result::Result<T, ZonewatchError>;

impl ZonewatchError {
    /// Returns `true` if the monitoring service is the source of this error.
    #[inline]
    #[must_use]
    pub const fn is_monitoring_error(&self) -> bool {
        matches!(self, Self::Monitoring(_) | Self::MonitoringFailed { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) | Self::ServerNotConfigured
        )
    }

    /// Returns `true` if this error represents an expected operational state.
    ///
    /// Running without a server is a valid setup, not a failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::ServerNotConfigured)
    }

    /// Returns `true` if a later event is likely to succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LocationUnavailable(_)
                | Self::SubmissionFailed(_)
                | Self::MonitoringFailed { .. }
                | Self::Monitoring(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ZoneNotFound(_) => 404,

            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            Self::SubmissionFailed(_) => 502,

            Self::Monitoring(_)
            | Self::MonitoringFailed { .. }
            | Self::LocationUnavailable(_)
            | Self::ServerNotConfigured => 503,

            Self::ZoneWriteFailed(_) | Self::PersistenceError(_) | Self::IoError(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Monitoring(_) => "MONITORING_ERROR",
            Self::MonitoringFailed { .. } => "MONITORING_FAILED",
            Self::ZoneNotFound(_) => "ZONE_NOT_FOUND",
            Self::ZoneWriteFailed(_) => "ZONE_WRITE_FAILED",
            Self::LocationUnavailable(_) => "LOCATION_UNAVAILABLE",
            Self::SubmissionFailed(_) => "SUBMISSION_FAILED",
            Self::ServerNotConfigured => "SERVER_NOT_CONFIGURED",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// IGNORE REASONS
// =============================================================================

/// Why an event carried no actionable work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IgnoreReason {
    /// A foreground one-shot location query is running elsewhere in the app.
    #[error("ignoring during one-shot location query")]
    DuringOneShot,

    /// A location batch arrived with no fixes in it.
    #[error("location update contained no locations")]
    LocationMissingEntries,

    /// The newest fix in a location batch is too old to act on.
    #[error("location update is too old")]
    LocationUpdateTooOld,

    /// The platform could not decide the region state.
    #[error("region state is unknown")]
    UnknownRegionState,

    /// The region does not belong to any stored zone.
    #[error("region does not match a known zone")]
    UnknownRegion,

    /// Tracking is disabled for the zone.
    #[error("zone has tracking disabled")]
    ZoneDisabled,

    /// Connected to a Wi-Fi network in the zone's filter.
    #[error("ignoring region change while connected to {0}")]
    IgnoredSsid(String),

    /// Beacon exits never drive a submission.
    #[error("beacon region exits are not submitted")]
    BeaconExitIgnored,

    /// A location was submitted too recently.
    #[error("location was updated recently")]
    RecentlyUpdated,

    /// Writing the zone's membership flag failed.
    #[error("failed to update zone: {0}")]
    ZoneUpdateFailed(ZoneStoreError),
}

/// Outcome of processing an event that did not succeed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The event carried no actionable work.
    #[error("ignored: {0}")]
    Ignored(IgnoreReason),

    /// Processing failed.
    #[error(transparent)]
    Failed(#[from] ZonewatchError),
}

impl ProcessError {
    /// Returns `true` for expected, non-actionable outcomes.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }

    /// The ignore reason, if this outcome is an ignore.
    #[must_use]
    pub const fn ignore_reason(&self) -> Option<&IgnoreReason> {
        match self {
            Self::Ignored(reason) => Some(reason),
            Self::Failed(_) => None,
        }
    }
}

impl From<IgnoreReason> for ProcessError {
    fn from(reason: IgnoreReason) -> Self {
        Self::Ignored(reason)
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<MonitorError> for ZonewatchError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::StartFailed {
                identifier,
                message,
            }
            | MonitorError::StopFailed {
                identifier,
                message,
            } => Self::MonitoringFailed {
                identifier,
                message,
            },
            MonitorError::Configuration(message) => Self::Monitoring(message),
        }
    }
}

impl From<ZoneStoreError> for ZonewatchError {
    fn from(err: ZoneStoreError) -> Self {
        match err {
            ZoneStoreError::NotFound(id) => Self::ZoneNotFound(id),
            ZoneStoreError::WriteFailed(message) => Self::ZoneWriteFailed(message),
        }
    }
}

impl From<ZoneFileError> for ZonewatchError {
    fn from(err: ZoneFileError) -> Self {
        match err {
            ZoneFileError::Read { path, source } | ZoneFileError::Write { path, source } => {
                Self::PersistenceError(format!("{}: {source}", path.display()))
            }
            ZoneFileError::Parse(e) => Self::PersistenceError(e.to_string()),
        }
    }
}

impl From<SubmitError> for ZonewatchError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::NotConfigured => Self::ServerNotConfigured,
            other => Self::SubmissionFailed(other.to_string()),
        }
    }
}

impl From<LocatorError> for ZonewatchError {
    fn from(err: LocatorError) -> Self {
        Self::LocationUnavailable(err.to_string())
    }
}

impl From<ConfigError> for ZonewatchError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::NoConfigDirectory => {
                Self::PersistenceError("Cannot determine config directory".into())
            }
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
