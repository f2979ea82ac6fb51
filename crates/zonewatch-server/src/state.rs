//! Application state shared across handlers.

use std::sync::Arc;

use zonewatch_core::{
    load_zones, save_zones, ApiClient, CoordinationContext, Coordinator, CoordinatorSettings,
    MemoryClientEventStore, MemoryRegionMonitor, MemoryZoneStore, Services, TimedBackground, Zone,
    ZoneFileError, ZoneStore, ZonewatchConfig,
};

use crate::platform::{LastKnownLocator, ReportedConnectivity};
use crate::webhook::WebhookClient;

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// State handed to every handler.
pub type SharedState = AppState;

struct AppStateInner {
    config: ZonewatchConfig,
    coordinator: Coordinator,
    zones: Arc<MemoryZoneStore>,
    monitor: Arc<MemoryRegionMonitor>,
    diagnostics: Arc<MemoryClientEventStore>,
    connectivity: Arc<ReportedConnectivity>,
    locator: Arc<LastKnownLocator>,
}

impl AppState {
    /// Build state from configuration: preload zones and post to the
    /// configured webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone file cannot be read or the webhook URL is invalid.
    pub fn new(config: ZonewatchConfig) -> anyhow::Result<Self> {
        let zones = match &config.server.zones_path {
            Some(path) => load_zones(path)?,
            None => Vec::new(),
        };
        let api = Arc::new(WebhookClient::new(config.server.webhook_url.as_deref())?);
        Ok(Self::with_api(config, zones, api))
    }

    /// Build state around an explicit API client.
    #[must_use]
    pub fn with_api(config: ZonewatchConfig, zones: Vec<Zone>, api: Arc<dyn ApiClient>) -> Self {
        let zone_store = Arc::new(MemoryZoneStore::with_zones(zones));
        let monitor = Arc::new(MemoryRegionMonitor::new());
        let diagnostics = Arc::new(MemoryClientEventStore::new(config.diagnostics.capacity));
        let connectivity = Arc::new(ReportedConnectivity::default());
        let locator = Arc::new(LastKnownLocator::default());

        let services = Services {
            zones: zone_store.clone(),
            monitor: monitor.clone(),
            api,
            locator: locator.clone(),
            connectivity: connectivity.clone(),
            background: Arc::new(TimedBackground::new(config.processing.background_budget())),
            diagnostics: diagnostics.clone(),
        };
        let context = CoordinationContext::new(config.processing.platform);
        let coordinator = Coordinator::new(services, context, CoordinatorSettings::from_config(&config));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                coordinator,
                zones: zone_store,
                monitor,
                diagnostics,
                connectivity,
                locator,
            }),
        }
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &ZonewatchConfig {
        &self.inner.config
    }

    /// The monitoring session.
    #[must_use]
    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    /// Zone store.
    #[must_use]
    pub fn zones(&self) -> &MemoryZoneStore {
        &self.inner.zones
    }

    /// Regions currently monitored.
    #[must_use]
    pub fn monitor(&self) -> &MemoryRegionMonitor {
        &self.inner.monitor
    }

    /// Diagnostic history.
    #[must_use]
    pub fn diagnostics(&self) -> &MemoryClientEventStore {
        &self.inner.diagnostics
    }

    /// Device-reported connectivity.
    #[must_use]
    pub fn connectivity(&self) -> &ReportedConnectivity {
        &self.inner.connectivity
    }

    /// Device-reported location.
    #[must_use]
    pub fn locator(&self) -> &LastKnownLocator {
        &self.inner.locator
    }

    /// Write the zones back to the configured zone file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist_zones(&self) -> Result<(), ZoneFileError> {
        let Some(path) = &self.inner.config.server.zones_path else {
            return Ok(());
        };
        save_zones(path, &self.inner.zones.zones())?;
        tracing::debug!(path = %path.display(), "zones saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use zonewatch_core::Coordinate;

    use super::*;

    fn config_in(dir: &TempDir) -> ZonewatchConfig {
        let mut config = ZonewatchConfig::default();
        config.server.zones_path = Some(dir.path().join("zones").join("zones.json"));
        config
    }

    #[tokio::test]
    async fn test_zones_survive_restart() {
        let dir = TempDir::new().unwrap();

        let state = AppState::new(config_in(&dir)).unwrap();
        assert!(state.zones().zones().is_empty());

        state
            .zones()
            .upsert(Zone::new("zone.work", Coordinate::new(37.2345, -122.5678), 150.0))
            .unwrap();
        state.persist_zones().unwrap();

        let restarted = AppState::new(config_in(&dir)).unwrap();
        let zones = restarted.zones().zones();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, "zone.work");
        assert_eq!(zones[0].radius, 150.0);
    }

    #[test]
    fn test_persist_without_zone_file_is_noop() {
        let state = AppState::with_api(
            ZonewatchConfig::default(),
            Vec::new(),
            Arc::new(zonewatch_core::testing::RecordingApiClient::new()),
        );
        assert!(state.persist_zones().is_ok());
    }
}
