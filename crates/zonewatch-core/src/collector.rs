//! Translating region-monitoring callbacks into [`Event`]s.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::context::Platform;
use crate::event::{Event, ManagerState};
use crate::geo::Location;
use crate::region::{EquatableRegion, Region, RegionState};
use crate::services::{RegionMonitor, ZoneStore};
use crate::zone::zone_identifier;

/// A callback from the region-monitoring service.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorCallback {
    /// The service failed in general.
    Error(String),
    /// The service could not monitor a region.
    MonitoringFailed {
        /// The region.
        region: Region,
        /// Reason given by the service.
        error: String,
    },
    /// The service began monitoring a region.
    StartedMonitoring(Region),
    /// The service determined a region's state.
    DeterminedState {
        /// The region.
        region: Region,
        /// Its state.
        state: RegionState,
    },
    /// New location fixes, newest last.
    LocationUpdates(Vec<Location>),
}

/// Turns callbacks into events, resolving regions to zones.
pub struct EventCollector {
    zones: Arc<dyn ZoneStore>,
    monitor: Arc<dyn RegionMonitor>,
    platform: Platform,
    ignore_next_state: Mutex<HashSet<EquatableRegion>>,
}

impl EventCollector {
    /// Collector resolving zones from `zones` and requesting state from `monitor`.
    #[must_use]
    pub fn new(zones: Arc<dyn ZoneStore>, monitor: Arc<dyn RegionMonitor>, platform: Platform) -> Self {
        Self {
            zones,
            monitor,
            platform,
            ignore_next_state: Mutex::new(HashSet::new()),
        }
    }

    /// Swallow the next determined-state callback for `region`.
    ///
    /// Newly monitored regions get an immediate state callback that says
    /// nothing new. Marking the same region twice is the same as once.
    pub fn ignore_next_state(&self, region: &Region) {
        if let Ok(mut ignored) = self.ignore_next_state.lock() {
            ignored.insert(EquatableRegion::new(region.clone()));
        }
    }

    fn take_ignore(&self, region: &Region) -> bool {
        self.ignore_next_state
            .lock()
            .map(|mut ignored| ignored.remove(&EquatableRegion::new(region.clone())))
            .unwrap_or(false)
    }

    /// Handle one callback, producing an event when there is something to process.
    pub fn collect(&self, callback: MonitorCallback) -> Option<Event> {
        match callback {
            MonitorCallback::Error(error) => {
                ManagerState::DidError(&error).log();
                None
            }
            MonitorCallback::MonitoringFailed { region, error } => {
                ManagerState::DidFailMonitoring(&region, &error).log();
                None
            }
            MonitorCallback::StartedMonitoring(region) => {
                ManagerState::DidStartMonitoring(&region).log();
                if self.platform == Platform::Constrained {
                    tracing::debug!(region = %region.identifier(), "not requesting state on constrained platform");
                } else {
                    self.monitor.request_state(&region);
                }
                None
            }
            MonitorCallback::DeterminedState { region, state } => {
                if self.take_ignore(&region) {
                    tracing::debug!(region = %region.identifier(), %state, "ignoring initial state");
                    return None;
                }

                let zone = self.zones.zone(zone_identifier(region.identifier()));
                Some(Event::region(region, state, zone))
            }
            MonitorCallback::LocationUpdates(locations) => Some(Event::locations(locations)),
        }
    }
}

impl std::fmt::Debug for EventCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCollector")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::geo::Coordinate;
    use crate::monitor::{MemoryRegionMonitor, MonitorOperation};
    use crate::region::CircularRegion;
    use crate::store::MemoryZoneStore;
    use crate::zone::Zone;

    fn home() -> Zone {
        Zone::new("zone.home", Coordinate::new(37.1234, -122.4567), 50.0)
    }

    fn circle(identifier: &str) -> Region {
        CircularRegion::new(identifier, Coordinate::new(37.1234, -122.4567), 100.0).into()
    }

    fn collector(platform: Platform) -> (EventCollector, Arc<MemoryRegionMonitor>) {
        let store = Arc::new(MemoryZoneStore::with_zones([home()]));
        let monitor = Arc::new(MemoryRegionMonitor::new());
        (EventCollector::new(store, monitor.clone(), platform), monitor)
    }

    #[test]
    fn test_determined_state_resolves_sub_region_zone() {
        let (collector, _) = collector(Platform::Standard);
        let event = collector
            .collect(MonitorCallback::DeterminedState {
                region: circle("zone.home@120"),
                state: RegionState::Inside,
            })
            .unwrap();
        assert_eq!(event.associated_zone, Some(home()));
    }

    #[test]
    fn test_unknown_region_has_no_zone() {
        let (collector, _) = collector(Platform::Standard);
        let event = collector
            .collect(MonitorCallback::DeterminedState {
                region: circle("zone.elsewhere"),
                state: RegionState::Inside,
            })
            .unwrap();
        assert!(event.associated_zone.is_none());
    }

    #[test]
    fn test_ignore_next_state_consumed_once() {
        let (collector, _) = collector(Platform::Standard);
        collector.ignore_next_state(&circle("zone.home"));
        collector.ignore_next_state(&circle("zone.home"));

        let callback = MonitorCallback::DeterminedState {
            region: circle("zone.home"),
            state: RegionState::Outside,
        };
        assert!(collector.collect(callback.clone()).is_none());
        assert!(collector.collect(callback).is_some());
    }

    #[test]
    fn test_started_monitoring_requests_state() {
        let (collector, monitor) = collector(Platform::Standard);
        assert!(collector
            .collect(MonitorCallback::StartedMonitoring(circle("zone.home")))
            .is_none());
        assert_eq!(
            monitor.operations(),
            vec![MonitorOperation::RequestState(circle("zone.home"))]
        );
    }

    #[test]
    fn test_constrained_platform_skips_state_request() {
        let (collector, monitor) = collector(Platform::Constrained);
        collector.collect(MonitorCallback::StartedMonitoring(circle("zone.home")));
        assert!(monitor.operations().is_empty());
    }

    #[test]
    fn test_errors_produce_no_events() {
        let (collector, _) = collector(Platform::Standard);
        assert!(collector.collect(MonitorCallback::Error("denied".into())).is_none());
        assert!(collector
            .collect(MonitorCallback::MonitoringFailed {
                region: circle("zone.home"),
                error: "limit".into(),
            })
            .is_none());
    }

    #[test]
    fn test_location_updates_become_batch() {
        let (collector, _) = collector(Platform::Standard);
        let location = Location::new(Coordinate::new(1.0, 2.0), 5.0, Utc::now());
        let event = collector
            .collect(MonitorCallback::LocationUpdates(vec![location.clone()]))
            .unwrap();
        assert_eq!(event, Event::locations(vec![location]));
    }
}
