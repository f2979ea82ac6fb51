//! Contracts for the collaborators this subsystem consumes.
//!
//! The region-monitoring service, zone store, outbound API, one-shot location
//! fetch, connectivity information and background execution are all owned by
//! the surrounding application. The core only talks to them through these
//! traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::event::TriggerKind;
use crate::geo::Location;
use crate::region::Region;
use crate::store::ZoneStoreError;
use crate::zone::Zone;

// =============================================================================
// REGION MONITORING
// =============================================================================

/// Errors reported by the region-monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// The service refused to start monitoring a region.
    #[error("failed to start monitoring {identifier}: {message}")]
    StartFailed {
        /// Region identifier.
        identifier: String,
        /// Reason given by the service.
        message: String,
    },

    /// The service refused to stop monitoring a region.
    #[error("failed to stop monitoring {identifier}: {message}")]
    StopFailed {
        /// Region identifier.
        identifier: String,
        /// Reason given by the service.
        message: String,
    },

    /// The service rejected its configuration.
    #[error("failed to configure region monitoring: {0}")]
    Configuration(String),
}

/// Background behavior requested from the monitoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Keep delivering updates while the app is backgrounded.
    pub allows_background_updates: bool,
    /// Let the platform pause updates on its own.
    pub pauses_automatically: bool,
    /// Monitor significant location changes.
    pub significant_location_changes: bool,
}

/// The platform's region-monitoring service.
///
/// The service keys regions by identifier: starting a region whose identifier
/// is already monitored replaces it.
#[async_trait]
pub trait RegionMonitor: Send + Sync {
    /// Apply background behavior settings.
    async fn configure(&self, settings: MonitorSettings) -> Result<(), MonitorError>;

    /// Regions currently monitored.
    fn monitored_regions(&self) -> Vec<Region>;

    /// Most recent location the service knows about.
    fn last_location(&self) -> Option<Location>;

    /// Begin monitoring a region. Resolves once the service accepted it.
    async fn start_monitoring(&self, region: &Region) -> Result<(), MonitorError>;

    /// Stop monitoring a region. Resolves once the service acknowledged it.
    async fn stop_monitoring(&self, region: &Region) -> Result<(), MonitorError>;

    /// Ask for the current state of a region. The answer, if any, arrives as a callback.
    fn request_state(&self, region: &Region);
}

// =============================================================================
// ZONE STORE
// =============================================================================

/// What changed in the zone store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneChange {
    /// A zone was added.
    Inserted(String),
    /// A zone was modified.
    Updated(String),
    /// A zone was removed.
    Deleted(String),
}

/// Notification sent after every zone store change.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    /// Tracking-enabled zones after the change.
    pub zones: Vec<Zone>,
    /// The change that produced this snapshot.
    pub change: ZoneChange,
}

/// Persistent, observable collection of zones.
pub trait ZoneStore: Send + Sync {
    /// Every stored zone.
    fn zones(&self) -> Vec<Zone>;

    /// Zones with tracking enabled.
    fn tracking_zones(&self) -> Vec<Zone> {
        self.zones()
            .into_iter()
            .filter(|zone| zone.tracking_enabled)
            .collect()
    }

    /// Look up a zone by identifier.
    fn zone(&self, id: &str) -> Option<Zone>;

    /// Transactionally write the zone's `in_region` flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone is missing or the write fails.
    fn set_in_region(&self, id: &str, in_region: bool) -> Result<(), ZoneStoreError>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ZoneSnapshot>;
}

// =============================================================================
// OUTBOUND API
// =============================================================================

/// Errors from the outbound API client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No server is configured to submit to.
    #[error("no server configured for location updates")]
    NotConfigured,

    /// The request could not be delivered.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server rejected the request.
    #[error("server rejected request with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },
}

/// Client for the remote server. Retrying and queueing are its own business.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Submit a location update.
    async fn submit_location(
        &self,
        trigger: TriggerKind,
        location: Option<&Location>,
        zone: Option<&Zone>,
    ) -> Result<(), SubmitError>;

    /// Fire an analytics event.
    async fn create_event(
        &self,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<(), SubmitError>;
}

// =============================================================================
// ONE-SHOT LOCATION
// =============================================================================

/// Errors from a one-shot location fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// No fix arrived before the timeout.
    #[error("no location before the timeout elapsed")]
    OutOfTime,

    /// The platform could not produce a fix.
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Bounded single location fetch.
#[async_trait]
pub trait OneShotLocator: Send + Sync {
    /// Fetch one fix, giving up after `timeout`.
    async fn one_shot(&self, timeout: Duration) -> Result<Location, LocatorError>;

    /// Best fix already known, without waiting.
    fn last_known(&self) -> Option<Location>;
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Network information.
pub trait Connectivity: Send + Sync {
    /// SSID of the connected Wi-Fi network, if any.
    fn current_ssid(&self) -> Option<String>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Now.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// BACKGROUND EXECUTION
// =============================================================================

/// A granted background execution window. Ends when dropped.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    deadline: Option<Instant>,
}

impl BackgroundTask {
    /// Start a window named `name` lasting `budget`, or unbounded.
    #[must_use]
    pub fn new(name: impl Into<String>, budget: Option<Duration>) -> Self {
        let name = name.into();
        tracing::debug!(task = %name, ?budget, "background task started");
        Self {
            name,
            deadline: budget.map(|budget| Instant::now() + budget),
        }
    }

    /// Name the window was requested with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time left before the platform would suspend us, if bounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        tracing::debug!(task = %self.name, "background task ended");
    }
}

/// Grants continued execution while the app is backgrounded.
pub trait BackgroundExecution: Send + Sync {
    /// Request a window named `name`.
    fn begin(&self, name: &str) -> BackgroundTask;
}

/// Background windows with a fixed budget each.
#[derive(Debug, Clone, Copy)]
pub struct TimedBackground {
    budget: Duration,
}

impl TimedBackground {
    /// Every window lasts `budget`.
    #[must_use]
    pub const fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

impl BackgroundExecution for TimedBackground {
    fn begin(&self, name: &str) -> BackgroundTask {
        BackgroundTask::new(name, Some(self.budget))
    }
}

/// Run `work` inside a background window named `name`.
///
/// `work` receives the remaining time of the window; the window stays open
/// until the returned future completes.
pub async fn run_in_background<T, F, Fut>(background: &dyn BackgroundExecution, name: &str, work: F) -> T
where
    F: FnOnce(Option<Duration>) -> Fut,
    Fut: Future<Output = T>,
{
    let task = background.begin(name);
    let output = work(task.remaining()).await;
    drop(task);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let task = BackgroundTask::new("test", Some(Duration::from_secs(10)));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(task.remaining(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(task.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_unbounded_task_has_no_remaining() {
        let task = BackgroundTask::new("test", None);
        assert_eq!(task.remaining(), None);
        assert_eq!(task.name(), "test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_in_background_passes_budget() {
        let background = TimedBackground::new(Duration::from_secs(25));
        let remaining = run_in_background(&background, "work", |remaining| async move { remaining }).await;
        assert_eq!(remaining, Some(Duration::from_secs(25)));
    }

    #[test]
    fn test_error_messages() {
        let err = MonitorError::StartFailed {
            identifier: "zone.home".into(),
            message: "limit".into(),
        };
        assert!(err.to_string().contains("zone.home"));
        assert!(SubmitError::Rejected { status: 500 }.to_string().contains("500"));
        assert!(LocatorError::OutOfTime.to_string().contains("timeout"));
    }
}
