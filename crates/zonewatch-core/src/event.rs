//! Domain events produced from monitoring callbacks.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Location;
use crate::region::{Region, RegionState};
use crate::zone::{sub_region_suffix, Zone};

/// Analytics event fired when a zone is entered.
pub const ZONE_ENTERED_EVENT: &str = "ios.zone_entered";

/// Analytics event fired when a zone is exited.
pub const ZONE_EXITED_EVENT: &str = "ios.zone_exited";

/// What caused an outbound location submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// A circular region reported inside.
    #[serde(rename = "Geographic Region Entered")]
    GpsRegionEnter,
    /// A circular region reported outside.
    #[serde(rename = "Geographic Region Exited")]
    GpsRegionExit,
    /// A beacon region reported inside.
    #[serde(rename = "iBeacon Region Entered")]
    BeaconRegionEnter,
    /// A beacon region reported outside.
    #[serde(rename = "iBeacon Region Exited")]
    BeaconRegionExit,
    /// A batch of location updates arrived.
    #[serde(rename = "Significant Location Update")]
    SignificantLocationUpdate,
    /// Anything else.
    #[serde(rename = "Unknown")]
    Unknown,
}

impl TriggerKind {
    /// Human readable name, as sent to the server.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GpsRegionEnter => "Geographic Region Entered",
            Self::GpsRegionExit => "Geographic Region Exited",
            Self::BeaconRegionEnter => "iBeacon Region Entered",
            Self::BeaconRegionExit => "iBeacon Region Exited",
            Self::SignificantLocationUpdate => "Significant Location Update",
            Self::Unknown => "Unknown",
        }
    }

    /// How long a one-shot fetch for this trigger may take: the configured
    /// timeout, capped by the remaining background time.
    #[must_use]
    pub fn one_shot_timeout(self, configured: Duration, remaining: Option<Duration>) -> Duration {
        remaining.map_or(configured, |remaining| configured.min(remaining))
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two shapes of monitoring callback the processor acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A monitored region changed (or reported) state.
    RegionStateChange {
        /// The region the callback was about.
        region: Region,
        /// The reported state.
        state: RegionState,
    },
    /// One or more location fixes, newest last.
    LocationBatch(Vec<Location>),
}

/// An event plus the zone it resolved to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Zone the region belongs to. Always `None` for location batches.
    pub associated_zone: Option<Zone>,
}

/// An analytics event derived from a zone transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirableEvent {
    /// Event type, e.g. `ios.zone_entered`.
    pub event_type: String,
    /// Event payload.
    pub event_data: serde_json::Value,
}

impl Event {
    /// A region state change for `zone`.
    #[must_use]
    pub const fn region(region: Region, state: RegionState, zone: Option<Zone>) -> Self {
        Self {
            kind: EventKind::RegionStateChange { region, state },
            associated_zone: zone,
        }
    }

    /// A batch of location updates.
    #[must_use]
    pub const fn locations(locations: Vec<Location>) -> Self {
        Self {
            kind: EventKind::LocationBatch(locations),
            associated_zone: None,
        }
    }

    /// The trigger kind a submission for this event is tagged with.
    #[must_use]
    pub const fn trigger(&self) -> TriggerKind {
        match &self.kind {
            EventKind::RegionStateChange { region, state } => match (region.is_beacon(), state) {
                (false, RegionState::Inside) => TriggerKind::GpsRegionEnter,
                (false, RegionState::Outside) => TriggerKind::GpsRegionExit,
                (true, RegionState::Inside) => TriggerKind::BeaconRegionEnter,
                (true, RegionState::Outside) => TriggerKind::BeaconRegionExit,
                (_, RegionState::Unknown) => TriggerKind::Unknown,
            },
            EventKind::LocationBatch(_) => TriggerKind::SignificantLocationUpdate,
        }
    }

    /// Whether a fresh fix must be fetched before submitting.
    ///
    /// Beacon transitions describe proximity, not position, so the zone's own
    /// location is sent for them instead.
    #[must_use]
    pub const fn needs_fresh_location(&self) -> bool {
        match &self.kind {
            EventKind::RegionStateChange { region, .. } => !region.is_beacon(),
            EventKind::LocationBatch(_) => true,
        }
    }

    /// The location this event already carries, if any.
    ///
    /// Beacon events use the zone center with the zone radius as accuracy;
    /// location batches use their newest fix; circular events carry none.
    #[must_use]
    pub fn associated_location(&self, now: DateTime<Utc>) -> Option<Location> {
        match &self.kind {
            EventKind::RegionStateChange { region, .. } if region.is_beacon() => {
                self.associated_zone.as_ref().map(|zone| zone.location(now))
            }
            EventKind::RegionStateChange { .. } => None,
            EventKind::LocationBatch(locations) => locations.last().cloned(),
        }
    }

    /// The `ios.zone_entered` / `ios.zone_exited` analytics event, for region
    /// events with an associated zone and a definite state.
    #[must_use]
    pub fn zone_state_event(&self) -> Option<FirableEvent> {
        let EventKind::RegionStateChange { region, state } = &self.kind else {
            return None;
        };
        let zone = self.associated_zone.as_ref()?;

        let event_type = match state {
            RegionState::Inside => ZONE_ENTERED_EVENT,
            RegionState::Outside => ZONE_EXITED_EVENT,
            RegionState::Unknown => return None,
        };

        let mut data = serde_json::Map::new();
        data.insert("zone".into(), zone.id.clone().into());
        if let Some(suffix) = sub_region_suffix(region.identifier()) {
            data.insert("multi_region_zone_id".into(), suffix.into());
        }

        Some(FirableEvent {
            event_type: event_type.to_string(),
            event_data: data.into(),
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::RegionStateChange { region, state } => {
                write!(f, "region state {state} for {region}")?;
                if let Some(zone) = &self.associated_zone {
                    write!(f, " (zone {})", zone.id)?;
                }
                Ok(())
            }
            EventKind::LocationBatch(locations) => match locations.last() {
                Some(last) => write!(f, "{} location(s), last {last}", locations.len()),
                None => f.write_str("empty location update"),
            },
        }
    }
}

/// Lifecycle notes reported by the collector and processor, logged through `tracing`.
#[derive(Debug)]
pub enum ManagerState<'a> {
    /// The monitoring service reported an error.
    DidError(&'a str),
    /// The monitoring service could not monitor a region.
    DidFailMonitoring(&'a Region, &'a str),
    /// The monitoring service started monitoring a region.
    DidStartMonitoring(&'a Region),
    /// An event was accepted for submission.
    DidReceive(&'a Event),
    /// An event was ignored or failed.
    DidIgnore(&'a Event, &'a dyn std::error::Error),
}

impl ManagerState<'_> {
    /// Emit this state at its log level.
    pub fn log(&self) {
        match self {
            Self::DidError(error) => tracing::error!(%error, "region monitoring error"),
            Self::DidFailMonitoring(region, error) => {
                tracing::error!(%region, %error, "failed to monitor region");
            }
            Self::DidStartMonitoring(region) => tracing::info!(%region, "started monitoring region"),
            Self::DidReceive(event) => tracing::info!(%event, "received event"),
            Self::DidIgnore(event, error) => tracing::info!(%event, %error, "ignoring event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::region::{BeaconIdentity, BeaconRegion, CircularRegion};
    use crate::zone::HOME_ZONE_ID;

    fn home() -> Zone {
        Zone::new(HOME_ZONE_ID, Coordinate::new(37.1234, -122.4567), 50.0)
    }

    fn circle(identifier: &str) -> Region {
        CircularRegion::new(identifier, Coordinate::new(37.1234, -122.4567), 100.0).into()
    }

    fn beacon() -> Region {
        BeaconRegion {
            identifier: HOME_ZONE_ID.into(),
            beacon: BeaconIdentity {
                uuid: uuid::Uuid::nil(),
                major: Some(1),
                minor: None,
            },
        }
        .into()
    }

    #[test]
    fn test_trigger_mapping() {
        let zone = Some(home());
        assert_eq!(
            Event::region(circle("zone.home"), RegionState::Inside, zone.clone()).trigger(),
            TriggerKind::GpsRegionEnter
        );
        assert_eq!(
            Event::region(circle("zone.home"), RegionState::Outside, zone.clone()).trigger(),
            TriggerKind::GpsRegionExit
        );
        assert_eq!(
            Event::region(beacon(), RegionState::Inside, zone.clone()).trigger(),
            TriggerKind::BeaconRegionEnter
        );
        assert_eq!(
            Event::region(beacon(), RegionState::Outside, zone).trigger(),
            TriggerKind::BeaconRegionExit
        );
        assert_eq!(
            Event::locations(vec![]).trigger(),
            TriggerKind::SignificantLocationUpdate
        );
    }

    #[test]
    fn test_beacon_event_uses_zone_location() {
        let now = Utc::now();
        let event = Event::region(beacon(), RegionState::Inside, Some(home()));
        assert!(!event.needs_fresh_location());

        let location = event.associated_location(now).unwrap();
        assert_eq!(location.coordinate, home().center);
        assert!((location.horizontal_accuracy - 50.0).abs() < f64::EPSILON);

        let circular = Event::region(circle("zone.home"), RegionState::Inside, Some(home()));
        assert!(circular.needs_fresh_location());
        assert!(circular.associated_location(now).is_none());
    }

    #[test]
    fn test_batch_uses_last_location() {
        let now = Utc::now();
        let first = Location::new(Coordinate::new(1.0, 1.0), 5.0, now);
        let last = Location::new(Coordinate::new(2.0, 2.0), 5.0, now);
        let event = Event::locations(vec![first, last.clone()]);
        assert_eq!(event.associated_location(now), Some(last));
    }

    #[test]
    fn test_zone_state_event() {
        let entered = Event::region(circle("zone.home@120"), RegionState::Inside, Some(home()));
        let firable = entered.zone_state_event().unwrap();
        assert_eq!(firable.event_type, ZONE_ENTERED_EVENT);
        assert_eq!(
            firable.event_data,
            serde_json::json!({"zone": "zone.home", "multi_region_zone_id": "120"})
        );

        let exited = Event::region(circle("zone.home"), RegionState::Outside, Some(home()));
        let firable = exited.zone_state_event().unwrap();
        assert_eq!(firable.event_type, ZONE_EXITED_EVENT);
        assert_eq!(firable.event_data, serde_json::json!({"zone": "zone.home"}));

        assert!(Event::region(circle("zone.home"), RegionState::Inside, None)
            .zone_state_event()
            .is_none());
        assert!(Event::locations(vec![]).zone_state_event().is_none());
    }

    #[test]
    fn test_one_shot_timeout_capped_by_remaining() {
        let configured = Duration::from_secs(10);
        assert_eq!(
            TriggerKind::GpsRegionEnter.one_shot_timeout(configured, Some(Duration::from_secs(4))),
            Duration::from_secs(4)
        );
        assert_eq!(
            TriggerKind::GpsRegionEnter.one_shot_timeout(configured, None),
            configured
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::locations(vec![]).to_string(), "empty location update");
        let event = Event::region(circle("zone.home"), RegionState::Inside, Some(home()));
        assert!(event.to_string().contains("inside"));
        assert!(event.to_string().contains("zone.home"));
    }
}
