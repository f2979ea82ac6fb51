//! In-memory region-monitoring service.
//!
//! Keeps the monitored set keyed by identifier the way the platform service
//! does, and records every call so the host (and tests) can see what was asked
//! of it and in which order.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::geo::Location;
use crate::region::Region;
use crate::services::{MonitorError, MonitorSettings, RegionMonitor};

/// A call made against [`MemoryRegionMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOperation {
    /// Settings were applied.
    Configure(MonitorSettings),
    /// Monitoring started for a region.
    Start(Region),
    /// Monitoring stopped for a region.
    Stop(Region),
    /// A state request was made for a region.
    RequestState(Region),
}

#[derive(Debug, Default)]
struct MonitorInner {
    regions: Vec<Region>,
    last_location: Option<Location>,
    settings: Option<MonitorSettings>,
    operations: Vec<MonitorOperation>,
    rejected: Vec<String>,
}

/// Region monitor that keeps its state in memory.
#[derive(Debug, Default)]
pub struct MemoryRegionMonitor {
    inner: Mutex<MonitorInner>,
}

impl MemoryRegionMonitor {
    /// Create a monitor with nothing monitored.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor that already monitors `regions`.
    #[must_use]
    pub fn with_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        let monitor = Self::new();
        if let Ok(mut inner) = monitor.inner.lock() {
            inner.regions = regions.into_iter().collect();
        }
        monitor
    }

    /// Record the latest fix the service saw.
    pub fn set_last_location(&self, location: Option<Location>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_location = location;
        }
    }

    /// Make future start requests for `identifier` fail.
    pub fn reject(&self, identifier: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rejected.push(identifier.into());
        }
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<MonitorOperation> {
        self.inner
            .lock()
            .map(|inner| inner.operations.clone())
            .unwrap_or_default()
    }

    /// Forget the recorded calls.
    pub fn clear_operations(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.operations.clear();
        }
    }

    /// The most recently applied settings.
    #[must_use]
    pub fn settings(&self) -> Option<MonitorSettings> {
        self.inner.lock().ok().and_then(|inner| inner.settings)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MonitorInner>, MonitorError> {
        self.inner
            .lock()
            .map_err(|_| MonitorError::Configuration("monitor state lock poisoned".into()))
    }
}

#[async_trait]
impl RegionMonitor for MemoryRegionMonitor {
    async fn configure(&self, settings: MonitorSettings) -> Result<(), MonitorError> {
        let mut inner = self.lock()?;
        inner.settings = Some(settings);
        inner.operations.push(MonitorOperation::Configure(settings));
        Ok(())
    }

    fn monitored_regions(&self) -> Vec<Region> {
        self.inner
            .lock()
            .map(|inner| inner.regions.clone())
            .unwrap_or_default()
    }

    fn last_location(&self) -> Option<Location> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.last_location.clone())
    }

    async fn start_monitoring(&self, region: &Region) -> Result<(), MonitorError> {
        let mut inner = self.lock()?;
        if inner.rejected.iter().any(|id| id == region.identifier()) {
            return Err(MonitorError::StartFailed {
                identifier: region.identifier().to_string(),
                message: "rejected by monitor".into(),
            });
        }

        inner.regions.retain(|existing| existing.identifier() != region.identifier());
        inner.regions.push(region.clone());
        inner.operations.push(MonitorOperation::Start(region.clone()));
        Ok(())
    }

    async fn stop_monitoring(&self, region: &Region) -> Result<(), MonitorError> {
        let mut inner = self.lock()?;
        inner.regions.retain(|existing| existing.identifier() != region.identifier());
        inner.operations.push(MonitorOperation::Stop(region.clone()));
        Ok(())
    }

    fn request_state(&self, region: &Region) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.operations.push(MonitorOperation::RequestState(region.clone()));
        }
    }
}
