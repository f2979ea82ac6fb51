//! # zonewatch-core
//!
//! Core geofencing logic for the zonewatch location reporting system.
//!
//! This crate provides:
//! - Zone expansion into monitorable circular and beacon regions
//! - Region selection under the platform's per-kind monitoring ceilings
//! - Event collection, filtering and location sanitizing
//! - Configuration management and zone persistence
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`geo`] - Coordinates, location fixes and great-circle math
//! - [`region`] / [`zone`] - Monitorable regions and the zones they come from
//! - [`region_filter`] - Choosing which regions fit under the limits
//! - [`collector`] - Turning monitoring callbacks into [`Event`]s
//! - [`processor`] - Deciding whether an event is submitted and with which location
//! - [`fuzzer`] - Adjusting reported locations so the server agrees with the event
//! - [`coordinator`] - Session lifecycle and region sync
//! - [`services`] - Traits for the platform and server collaborators
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`store`] / [`monitor`] - In-memory collaborators and zone files
//! - [`diagnostics`] - User-visible history of what happened and why
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod fuzzer;
pub mod geo;
pub mod monitor;
pub mod processor;
pub mod region;
pub mod region_filter;
pub mod services;
pub mod store;
pub mod zone;

#[cfg(any(test, feature = "mock-platform"))]
pub mod testing;

// Re-export primary types for convenience
pub use collector::{EventCollector, MonitorCallback};
pub use config::{
    default_config_path, is_valid_webhook_url, ConfigError, ConfigResult, DiagnosticsConfig,
    LocationSources, MonitoringConfig, ProcessingConfig, ServerConfig, ZonewatchConfig,
};
pub use context::{CoordinationContext, OneShotGuard, Platform};
pub use coordinator::{Coordinator, CoordinatorSettings, Services, SyncReport};
pub use diagnostics::{ClientEvent, ClientEventKind, DiagnosticSink, MemoryClientEventStore};
pub use error::{IgnoreReason, ProcessError, Result, ZonewatchError};
pub use event::{Event, EventKind, FirableEvent, TriggerKind};
pub use fuzzer::{AccuracyFuzzer, Adjustment, FuzzerChain};
pub use geo::{Coordinate, Location};
pub use monitor::MemoryRegionMonitor;
pub use processor::{EventProcessor, ProcessorServices, ProcessorSettings};
pub use region::{BeaconIdentity, BeaconRegion, CircularRegion, EquatableRegion, Region, RegionState};
pub use region_filter::{RegionLimits, RegionSelectionFilter};
pub use services::{
    ApiClient, BackgroundExecution, Clock, Connectivity, LocatorError, MonitorError,
    MonitorSettings, OneShotLocator, RegionMonitor, SubmitError, SystemClock, TimedBackground,
    ZoneChange, ZoneSnapshot, ZoneStore,
};
pub use store::{load_zones, save_zones, MemoryZoneStore, ZoneFileError, ZoneStoreError};
pub use zone::{RegionGeometry, Zone, ZoneBeacon, HOME_ZONE_ID};
