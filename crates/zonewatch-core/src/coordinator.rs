//! Monitoring session lifecycle, region sync and event dispatch.
//!
//! The [`Coordinator`] keeps the monitored region set equal to what the
//! [`RegionSelectionFilter`] wants for the current zones. Syncs are serialized
//! behind a single async mutex, compare regions by full geometry
//! ([`EquatableRegion`]) and finish every removal before the first addition,
//! since the monitoring service keys regions by identifier and an edited zone
//! keeps its identifier.
//!
//! Monitoring callbacks go through the [`EventCollector`]; each resulting
//! event is processed on its own task so a slow or failing event never holds
//! up the next one.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

use crate::collector::{EventCollector, MonitorCallback};
use crate::config::{LocationSources, ZonewatchConfig};
use crate::context::CoordinationContext;
use crate::diagnostics::{ClientEvent, ClientEventKind, DiagnosticSink};
use crate::error::{ProcessError, ZonewatchError};
use crate::event::Event;
use crate::processor::{EventProcessor, ProcessorServices, ProcessorSettings};
use crate::region::{EquatableRegion, Region};
use crate::region_filter::{RegionLimits, RegionSelectionFilter};
use crate::services::{
    run_in_background, ApiClient, BackgroundExecution, Connectivity, MonitorSettings,
    OneShotLocator, RegionMonitor, ZoneSnapshot, ZoneStore,
};
use crate::zone::RegionGeometry;

/// Name of the background window each event is processed in.
pub const PERFORM_TASK_NAME: &str = "zone-manager-perform-event";

/// Everything the coordinator talks to.
#[derive(Clone)]
pub struct Services {
    /// Zones.
    pub zones: Arc<dyn ZoneStore>,
    /// Region-monitoring service.
    pub monitor: Arc<dyn RegionMonitor>,
    /// Outbound API.
    pub api: Arc<dyn ApiClient>,
    /// One-shot location fetch.
    pub locator: Arc<dyn OneShotLocator>,
    /// Network information.
    pub connectivity: Arc<dyn Connectivity>,
    /// Background execution windows.
    pub background: Arc<dyn BackgroundExecution>,
    /// User-visible diagnostic history.
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

/// Tunables for the coordinator and what it owns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
    /// Region ceilings.
    pub limits: RegionLimits,
    /// Zone expansion.
    pub geometry: RegionGeometry,
    /// Event processing.
    pub processor: ProcessorSettings,
    /// Initially enabled location sources.
    pub location_sources: LocationSources,
}

impl CoordinatorSettings {
    /// Settings from the application configuration.
    #[must_use]
    pub const fn from_config(config: &ZonewatchConfig) -> Self {
        let geometry = config.monitoring.geometry();
        Self {
            limits: config.monitoring.limits(),
            geometry,
            processor: ProcessorSettings::from_config(&config.processing, geometry),
            location_sources: config.location_sources,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&ZonewatchConfig::default())
    }
}

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Identifiers of regions whose monitoring started.
    pub added: Vec<String>,
    /// Identifiers of regions whose monitoring ended.
    pub removed: Vec<String>,
    /// Identifiers of regions the monitoring service refused.
    pub failed: Vec<String>,
}

impl SyncReport {
    /// Whether nothing was started or ended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct Inner {
    services: Services,
    context: CoordinationContext,
    collector: EventCollector,
    processor: EventProcessor,
    filter: RegionSelectionFilter,
    location_sources: Mutex<LocationSources>,
    sync_lock: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the monitoring session. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Wire up the collector, processor and filter. Nothing is monitored until
    /// [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(services: Services, context: CoordinationContext, settings: CoordinatorSettings) -> Self {
        let collector = EventCollector::new(
            Arc::clone(&services.zones),
            Arc::clone(&services.monitor),
            context.platform,
        );
        let processor = EventProcessor::new(
            ProcessorServices {
                zones: Arc::clone(&services.zones),
                api: Arc::clone(&services.api),
                locator: Arc::clone(&services.locator),
                connectivity: Arc::clone(&services.connectivity),
                monitor: Arc::clone(&services.monitor),
                background: Arc::clone(&services.background),
            },
            context.clone(),
            settings.processor,
        );
        let filter = RegionSelectionFilter::new(settings.limits, settings.geometry)
            .with_diagnostics(Arc::clone(&services.diagnostics));

        Self {
            inner: Arc::new(Inner {
                services,
                context,
                collector,
                processor,
                filter,
                location_sources: Mutex::new(settings.location_sources),
                sync_lock: tokio::sync::Mutex::new(()),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Shared coordination context.
    #[must_use]
    pub fn context(&self) -> &CoordinationContext {
        &self.inner.context
    }

    /// Currently enabled location sources.
    #[must_use]
    pub fn location_sources(&self) -> LocationSources {
        self.inner
            .location_sources
            .lock()
            .map(|sources| *sources)
            .unwrap_or_default()
    }

    /// Start the session: configure the monitoring service, subscribe to zone
    /// changes and run the initial sync.
    ///
    /// Zone changes are watched on a spawned task until [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns an error if the monitoring service rejects its configuration.
    pub async fn initialize(&self) -> Result<SyncReport, ZonewatchError> {
        tracing::info!("initializing zone monitoring");
        self.configure_monitor().await?;

        // subscribe first so no change between the initial sync and the watcher is lost
        let changes = self.inner.services.zones.subscribe();
        let report = self.sync().await;

        let watcher = tokio::spawn(self.clone().watch(changes));
        if let Ok(mut slot) = self.inner.watcher.lock() {
            if let Some(previous) = slot.replace(watcher) {
                previous.abort();
            }
        }

        Ok(report)
    }

    /// Stop watching zone changes.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.inner.watcher.lock() {
            if let Some(watcher) = slot.take() {
                watcher.abort();
                tracing::info!("stopped watching zone changes");
            }
        }
    }

    async fn watch(self, mut changes: Receiver<ZoneSnapshot>) {
        loop {
            match changes.recv().await {
                Ok(snapshot) => {
                    tracing::debug!(change = ?snapshot.change, zones = snapshot.zones.len(), "zone store changed");
                    self.sync().await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed zone changes, resyncing");
                    self.sync().await;
                }
                Err(RecvError::Closed) => {
                    tracing::info!("zone store closed, no longer watching");
                    break;
                }
            }
        }
    }

    async fn configure_monitor(&self) -> Result<(), ZonewatchError> {
        let sources = self.location_sources();
        if sources.significant_location_change {
            tracing::info!("started monitoring significant location changes");
        } else {
            tracing::info!("not monitoring significant location changes");
        }

        self.inner
            .services
            .monitor
            .configure(MonitorSettings {
                allows_background_updates: true,
                pauses_automatically: false,
                significant_location_changes: sources.significant_location_change,
            })
            .await?;
        Ok(())
    }

    /// Apply new location source settings and resync.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitoring service rejects its configuration.
    pub async fn location_settings_changed(
        &self,
        sources: LocationSources,
    ) -> Result<SyncReport, ZonewatchError> {
        if let Ok(mut current) = self.inner.location_sources.lock() {
            *current = sources;
        }
        self.inner.services.diagnostics.record(
            ClientEvent::new("Location settings changed", ClientEventKind::Settings)
                .with("zone", sources.zone)
                .with("significant_location_change", sources.significant_location_change),
        );

        self.configure_monitor().await?;
        Ok(self.sync().await)
    }

    /// Bring the monitored regions in line with the current zones.
    pub async fn sync(&self) -> SyncReport {
        let _serialized = self.inner.sync_lock.lock().await;

        let services = &self.inner.services;
        let zones = services.zones.tracking_zones();
        let current = services.monitor.monitored_regions();
        let enabled = self.location_sources().zone;

        let desired = if enabled {
            let last_location = services.monitor.last_location();
            self.inner
                .filter
                .regions(&zones, &current, last_location.as_ref())
        } else {
            Vec::new()
        };

        let actual = EquatableRegion::set(&current);
        let expected = EquatableRegion::set(&desired);
        let removals = sorted(actual.difference(&expected));
        let additions = sorted(expected.difference(&actual));

        let mut report = SyncReport::default();

        for region in removals {
            services.diagnostics.record(
                ClientEvent::new(
                    format!("Ending monitoring {}", region.identifier()),
                    ClientEventKind::RegionMonitoring,
                )
                .with("region", region.to_string()),
            );
            match services.monitor.stop_monitoring(&region).await {
                Ok(()) => report.removed.push(region.identifier().to_string()),
                Err(error) => {
                    tracing::error!(%region, %error, "failed to stop monitoring");
                    report.failed.push(region.identifier().to_string());
                }
            }
        }

        for region in additions {
            services.diagnostics.record(
                ClientEvent::new(
                    format!("Initially monitoring {}", region.identifier()),
                    ClientEventKind::RegionMonitoring,
                )
                .with("region", region.to_string()),
            );
            self.inner.collector.ignore_next_state(&region);
            match services.monitor.start_monitoring(&region).await {
                Ok(()) => report.added.push(region.identifier().to_string()),
                Err(error) => {
                    tracing::error!(%region, %error, "failed to start monitoring");
                    report.failed.push(region.identifier().to_string());
                }
            }
        }

        let beacon = expected.iter().filter(|r| r.region().is_beacon()).count();
        tracing::info!(
            available = zones.len(),
            enabled,
            monitoring = expected.len(),
            beacon,
            circular = expected.len() - beacon,
            started = report.added.len(),
            ended = report.removed.len(),
            "synced monitored regions"
        );

        report
    }

    /// Feed a monitoring callback in.
    ///
    /// When the callback produces an event, it is processed on a spawned task
    /// whose handle is returned.
    pub fn process_callback(&self, callback: MonitorCallback) -> Option<JoinHandle<()>> {
        let event = self.inner.collector.collect(callback)?;
        let coordinator = self.clone();
        Some(tokio::spawn(async move { coordinator.handle_event(event).await }))
    }

    /// Fire analytics, process the event and record the outcome.
    pub async fn handle_event(&self, event: Event) {
        self.fire(&event);

        let services = &self.inner.services;
        let start_ssid = services
            .connectivity
            .current_ssid()
            .unwrap_or_else(|| "none".into());

        let result = run_in_background(services.background.as_ref(), PERFORM_TASK_NAME, |_| {
            self.inner.processor.perform(&event)
        })
        .await;

        let entry = match result {
            Ok(()) => {
                // a fresh location may change which zones are nearest
                self.sync().await;
                ClientEvent::new("Updated location", ClientEventKind::LocationUpdate)
            }
            Err(error) => {
                match &error {
                    ProcessError::Ignored(reason) => {
                        tracing::info!(%event, %reason, "no location update");
                    }
                    ProcessError::Failed(failure) => {
                        tracing::error!(%event, error = %failure, "final error for event");
                    }
                }
                ClientEvent::new(format!("Didn't update: {error}"), ClientEventKind::LocationUpdate)
                    .with("error", format!("{error:?}"))
            }
        };

        services.diagnostics.record(
            entry
                .with("start_ssid", start_ssid)
                .with("event", event.to_string()),
        );
    }

    fn fire(&self, event: &Event) {
        let Some(firable) = event.zone_state_event() else {
            return;
        };

        let api = Arc::clone(&self.inner.services.api);
        tokio::spawn(async move {
            if let Err(error) = api.create_event(&firable.event_type, firable.event_data).await {
                tracing::warn!(event_type = %firable.event_type, %error, "failed to fire zone event");
            }
        });
    }
}

fn sorted<'a>(regions: impl Iterator<Item = &'a EquatableRegion>) -> Vec<Region> {
    let mut regions: Vec<Region> = regions.map(|region| region.region().clone()).collect();
    regions.sort_by(|lhs, rhs| lhs.identifier().cmp(rhs.identifier()));
    regions
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("context", &self.inner.context)
            .field("location_sources", &self.location_sources())
            .finish_non_exhaustive()
    }
}
