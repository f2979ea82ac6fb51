//! Zones and their expansion into monitorable regions.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{Coordinate, Location};
use crate::region::{BeaconIdentity, BeaconRegion, CircularRegion, Region};

/// Identifier of the designated home zone.
pub const HOME_ZONE_ID: &str = "zone.home";

/// Separator between a zone identifier and a sub-region suffix.
pub const SUB_REGION_SEPARATOR: char = '@';

/// Beacon identity as stored on a zone, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBeacon {
    /// Proximity UUID string.
    pub uuid: String,
    /// Optional major value.
    #[serde(default)]
    pub major: Option<u16>,
    /// Optional minor value.
    #[serde(default)]
    pub minor: Option<u16>,
}

/// A user-configured place, the source of monitored regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Entity identifier, e.g. `zone.home`.
    pub id: String,

    /// Friendly name, if the server provided one.
    #[serde(default)]
    pub name: Option<String>,

    /// Center of the zone.
    pub center: Coordinate,

    /// Radius in meters.
    pub radius: f64,

    /// Whether region events for this zone should be acted on.
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,

    /// Wi-Fi networks that suppress transitions for this zone.
    #[serde(default)]
    pub ssid_filter: Vec<String>,

    /// Beacon identity, if the zone is beacon-backed.
    #[serde(default)]
    pub beacon: Option<ZoneBeacon>,

    /// Last known membership, written by the event processor.
    #[serde(default)]
    pub in_region: bool,

    /// Passive zones never report their name as the device location.
    #[serde(default)]
    pub is_passive: bool,
}

const fn default_true() -> bool {
    true
}

/// Parameters controlling how zones expand into circular regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionGeometry {
    /// Smallest radius the platform reports reliably, in meters.
    pub minimum_radius: f64,
    /// How many circles a small zone is covered by.
    pub sub_region_count: usize,
}

impl RegionGeometry {
    /// Sub-region identifiers carry the bearing in whole degrees, so more
    /// circles than this would share identifiers.
    pub const MAX_SUB_REGIONS: usize = 360;
}

impl Default for RegionGeometry {
    fn default() -> Self {
        Self {
            minimum_radius: 100.0,
            sub_region_count: 3,
        }
    }
}

impl Zone {
    /// Create a tracking-enabled circular zone.
    #[must_use]
    pub fn new(id: impl Into<String>, center: Coordinate, radius: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            center,
            radius,
            tracking_enabled: true,
            ssid_filter: Vec::new(),
            beacon: None,
            in_region: false,
            is_passive: false,
        }
    }

    /// Whether this is the designated home zone.
    #[must_use]
    pub fn is_home(&self) -> bool {
        self.id == HOME_ZONE_ID
    }

    /// Human readable name: the friendly name, else the id without its domain.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        self.short_name()
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().collect::<String>() + chars.as_str()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The id without the `zone.` domain prefix.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.id.strip_prefix("zone.").unwrap_or(&self.id)
    }

    /// The zone's nominal circle.
    #[must_use]
    pub fn circular_region(&self) -> CircularRegion {
        CircularRegion::new(self.id.clone(), self.center, self.radius)
    }

    /// A synthetic fix at the zone center whose accuracy is the zone radius.
    #[must_use]
    pub fn location(&self, timestamp: DateTime<Utc>) -> Location {
        Location {
            altitude: Some(0.0),
            ..Location::new(self.center, self.radius, timestamp)
        }
    }

    /// Circles used to monitor this zone.
    ///
    /// Zones at least `minimum_radius` wide are monitored as-is. Smaller zones
    /// produce false enters, so they are covered by `sub_region_count` circles of
    /// `minimum_radius`, each pushed off-center so it is internally tangent to the
    /// zone. The overlap of all of them hugs the zone. Each identifier carries the
    /// offset bearing, e.g. `zone.cafe@120`.
    #[must_use]
    pub fn circular_regions_for_monitoring(&self, geometry: &RegionGeometry) -> Vec<CircularRegion> {
        if self.radius >= geometry.minimum_radius || geometry.sub_region_count < 2 {
            return vec![self.circular_region()];
        }

        let count = geometry.sub_region_count.min(RegionGeometry::MAX_SUB_REGIONS);
        let offset = geometry.minimum_radius - self.radius;
        let slice = 2.0 * PI / count as f64;

        (0..count)
            .map(|index| {
                let bearing = slice * index as f64;
                CircularRegion::new(
                    format!(
                        "{}{SUB_REGION_SEPARATOR}{:03.0}",
                        self.id,
                        bearing.to_degrees()
                    ),
                    self.center.moving(offset, bearing),
                    geometry.minimum_radius,
                )
            })
            .collect()
    }

    /// The validated beacon identity, if any.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the stored UUID is not a valid UUID.
    pub fn beacon_identity(&self) -> Result<Option<BeaconIdentity>, uuid::Error> {
        let Some(beacon) = &self.beacon else {
            return Ok(None);
        };

        let uuid = Uuid::parse_str(&beacon.uuid)?;
        Ok(Some(BeaconIdentity {
            uuid,
            major: beacon.major,
            minor: beacon.major.and(beacon.minor),
        }))
    }

    /// The beacon region for this zone, skipping an invalid identity.
    #[must_use]
    pub fn beacon_region(&self) -> Option<BeaconRegion> {
        match self.beacon_identity() {
            Ok(identity) => identity.map(|beacon| BeaconRegion {
                identifier: self.id.clone(),
                beacon,
            }),
            Err(error) => {
                tracing::warn!(zone = %self.id, %error, "invalid beacon uuid, not monitoring beacon");
                None
            }
        }
    }

    /// Every region this zone should be monitored with.
    ///
    /// A zone with a valid beacon identity is monitored by its beacon region
    /// alone. Its circle would share the zone identifier, and the monitoring
    /// service keeps one region per identifier.
    #[must_use]
    pub fn regions_for_monitoring(&self, geometry: &RegionGeometry) -> Vec<Region> {
        if let Some(beacon) = self.beacon_region() {
            return vec![beacon.into()];
        }

        self.circular_regions_for_monitoring(geometry)
            .into_iter()
            .map(Region::from)
            .collect()
    }

    /// Whether every monitoring circle overlaps the fix's accuracy circle.
    #[must_use]
    pub fn contains_in_regions(&self, location: &Location, geometry: &RegionGeometry) -> bool {
        self.circular_regions_for_monitoring(geometry)
            .iter()
            .all(|region| region.contains_with_accuracy(location))
    }
}

/// The zone identifier a region identifier belongs to.
///
/// Sub-region identifiers (`zone.cafe@120`) map back to `zone.cafe`; plain
/// identifiers are returned unchanged.
#[must_use]
pub fn zone_identifier(region_identifier: &str) -> &str {
    region_identifier
        .rsplit_once(SUB_REGION_SEPARATOR)
        .map_or(region_identifier, |(zone, _)| zone)
}

/// The sub-region suffix of a region identifier, if present.
#[must_use]
pub fn sub_region_suffix(region_identifier: &str) -> Option<&str> {
    region_identifier
        .rsplit_once(SUB_REGION_SEPARATOR)
        .map(|(_, suffix)| suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_zone() -> Zone {
        Zone::new("zone.cafe", Coordinate::new(37.7749, -122.4194), 40.0)
    }

    #[test]
    fn test_large_zone_single_region() {
        let zone = Zone::new("zone.work", Coordinate::new(37.2345, -122.5678), 100.0);
        let regions = zone.regions_for_monitoring(&RegionGeometry::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].identifier(), "zone.work");
    }

    #[test]
    fn test_small_zone_expands_into_tangent_circles() {
        let zone = small_zone();
        let regions = zone.circular_regions_for_monitoring(&RegionGeometry::default());

        let identifiers: Vec<&str> = regions.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["zone.cafe@000", "zone.cafe@120", "zone.cafe@240"]);

        for region in &regions {
            assert!((region.radius - 100.0).abs() < f64::EPSILON);
            // each circle contains the whole zone circle, touching it on the far side
            let offset = region.center.distance_to(&zone.center);
            assert!((offset + zone.radius - region.radius).abs() < 0.01);
        }
    }

    #[test]
    fn test_sub_region_identifiers_stay_unique() {
        let geometry = RegionGeometry {
            minimum_radius: 100.0,
            sub_region_count: 1_000,
        };
        let regions = small_zone().circular_regions_for_monitoring(&geometry);
        assert_eq!(regions.len(), RegionGeometry::MAX_SUB_REGIONS);

        let identifiers: std::collections::HashSet<&str> =
            regions.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(identifiers.len(), regions.len());
    }

    #[test]
    fn test_zone_identifier_strips_suffix() {
        assert_eq!(zone_identifier("zone.cafe@120"), "zone.cafe");
        assert_eq!(zone_identifier("zone.cafe"), "zone.cafe");
        assert_eq!(sub_region_suffix("zone.cafe@120"), Some("120"));
        assert_eq!(sub_region_suffix("zone.cafe"), None);
    }

    #[test]
    fn test_beacon_zone_monitored_by_beacon_only() {
        let mut zone = small_zone();
        zone.beacon = Some(ZoneBeacon {
            uuid: "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0".into(),
            major: Some(1),
            minor: Some(2),
        });

        let regions = zone.regions_for_monitoring(&RegionGeometry::default());
        assert_eq!(regions.len(), 1);
        assert!(regions[0].is_beacon());
        assert_eq!(regions[0].identifier(), "zone.cafe");
    }

    #[test]
    fn test_invalid_beacon_uuid_is_skipped() {
        let mut zone = small_zone();
        zone.beacon = Some(ZoneBeacon {
            uuid: "not-a-uuid".into(),
            major: None,
            minor: None,
        });

        assert!(zone.beacon_identity().is_err());
        assert!(zone.beacon_region().is_none());
        assert_eq!(zone.regions_for_monitoring(&RegionGeometry::default()).len(), 3);
    }

    #[test]
    fn test_minor_requires_major() {
        let mut zone = small_zone();
        zone.beacon = Some(ZoneBeacon {
            uuid: Uuid::nil().to_string(),
            major: None,
            minor: Some(7),
        });
        let identity = zone.beacon_identity().unwrap().unwrap();
        assert_eq!(identity.minor, None);
    }

    #[test]
    fn test_display_name() {
        let mut zone = Zone::new("zone.given_name", Coordinate::new(0.0, 0.0), 10.0);
        assert_eq!(zone.display_name(), "Given Name");
        zone.name = Some("Custom".into());
        assert_eq!(zone.display_name(), "Custom");
    }

    #[test]
    fn test_zone_deserializes_with_defaults() {
        let zone: Zone = serde_json::from_str(
            r#"{"id":"zone.home","center":{"latitude":1.0,"longitude":2.0},"radius":50.0}"#,
        )
        .unwrap();
        assert!(zone.tracking_enabled);
        assert!(zone.is_home());
        assert!(zone.ssid_filter.is_empty());
    }
}
