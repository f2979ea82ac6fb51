//! Monitorable regions and the geometry-aware equality used to diff them.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{Coordinate, Location};

/// A circular geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularRegion {
    /// Identifier the monitoring service keys this region by.
    pub identifier: String,
    /// Center of the circle.
    pub center: Coordinate,
    /// Radius in meters.
    pub radius: f64,
}

impl CircularRegion {
    /// Create a circular region.
    #[must_use]
    pub fn new(identifier: impl Into<String>, center: Coordinate, radius: f64) -> Self {
        Self {
            identifier: identifier.into(),
            center,
            radius,
        }
    }

    /// Whether the literal coordinate lies within the circle.
    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.center.distance_to(coordinate) <= self.radius
    }

    /// How far the fix's accuracy circle is from touching this region.
    ///
    /// Zero or negative means the two circles overlap.
    #[must_use]
    pub fn distance_with_accuracy(&self, location: &Location) -> f64 {
        self.center.distance_to(&location.coordinate) - self.radius - location.horizontal_accuracy
    }

    /// Whether the fix's accuracy circle overlaps this region.
    #[must_use]
    pub fn contains_with_accuracy(&self, location: &Location) -> bool {
        self.distance_with_accuracy(location) <= 0.0
    }
}

/// Identity of a proximity beacon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconIdentity {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major value, if constrained.
    pub major: Option<u16>,
    /// Minor value, if constrained. Only meaningful with a major value.
    pub minor: Option<u16>,
}

/// A geofence defined by a beacon identity instead of geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconRegion {
    /// Identifier the monitoring service keys this region by.
    pub identifier: String,
    /// The beacon to range for.
    pub beacon: BeaconIdentity,
}

/// The two kinds of region the platform can monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Center and radius.
    Circular,
    /// Beacon identity.
    Beacon,
}

/// A monitorable geofence descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Region {
    /// Circular geofence.
    Circular(CircularRegion),
    /// Beacon geofence.
    Beacon(BeaconRegion),
}

impl Region {
    /// Identifier the monitoring service keys this region by.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Circular(region) => &region.identifier,
            Self::Beacon(region) => &region.identifier,
        }
    }

    /// Which kind of region this is.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        match self {
            Self::Circular(_) => RegionKind::Circular,
            Self::Beacon(_) => RegionKind::Beacon,
        }
    }

    /// Whether this is a beacon region.
    #[must_use]
    pub const fn is_beacon(&self) -> bool {
        matches!(self, Self::Beacon(_))
    }

    /// The circular geometry, if this is a circular region.
    #[must_use]
    pub const fn as_circular(&self) -> Option<&CircularRegion> {
        match self {
            Self::Circular(region) => Some(region),
            Self::Beacon(_) => None,
        }
    }
}

impl From<CircularRegion> for Region {
    fn from(region: CircularRegion) -> Self {
        Self::Circular(region)
    }
}

impl From<BeaconRegion> for Region {
    fn from(region: BeaconRegion) -> Self {
        Self::Beacon(region)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Circular(region) => write!(
                f,
                "CircularRegion {} center {} radius {:.1}m",
                region.identifier, region.center, region.radius
            ),
            Self::Beacon(region) => {
                write!(f, "BeaconRegion {} uuid {}", region.identifier, region.beacon.uuid)?;
                if let Some(major) = region.beacon.major {
                    write!(f, " major {major}")?;
                }
                if let Some(minor) = region.beacon.minor {
                    write!(f, " minor {minor}")?;
                }
                Ok(())
            }
        }
    }
}

/// State the platform reports for a monitored region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// The device is inside the region.
    Inside,
    /// The device is outside the region.
    Outside,
    /// The platform could not decide.
    Unknown,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
            Self::Unknown => "unknown",
        })
    }
}

/// A region compared by its full geometry rather than its identifier.
///
/// Identifiers survive zone edits (a radius change keeps the zone's id), so
/// diffing monitored regions by identifier would miss the remove-and-add
/// needed to pick up the new geometry. Two `EquatableRegion`s are equal only
/// when identifier, kind and every geometric field match; floats compare by
/// bit pattern with `-0.0` folded into `0.0` so `Eq` and `Hash` agree.
#[derive(Debug, Clone)]
pub struct EquatableRegion(Region);

impl EquatableRegion {
    /// Wrap a region.
    #[must_use]
    pub const fn new(region: Region) -> Self {
        Self(region)
    }

    /// The wrapped region.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.0
    }

    /// Collect regions into a geometry-keyed set.
    pub fn set<'a>(regions: impl IntoIterator<Item = &'a Region>) -> HashSet<Self> {
        regions.into_iter().cloned().map(Self).collect()
    }
}

fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for EquatableRegion {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Region::Circular(lhs), Region::Circular(rhs)) => {
                lhs.identifier == rhs.identifier
                    && float_bits(lhs.center.latitude) == float_bits(rhs.center.latitude)
                    && float_bits(lhs.center.longitude) == float_bits(rhs.center.longitude)
                    && float_bits(lhs.radius) == float_bits(rhs.radius)
            }
            (Region::Beacon(lhs), Region::Beacon(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for EquatableRegion {}

impl Hash for EquatableRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.kind().hash(state);
        self.0.identifier().hash(state);
        match &self.0 {
            Region::Circular(region) => {
                float_bits(region.center.latitude).hash(state);
                float_bits(region.center.longitude).hash(state);
                float_bits(region.radius).hash(state);
            }
            Region::Beacon(region) => region.beacon.hash(state),
        }
    }
}

impl From<Region> for EquatableRegion {
    fn from(region: Region) -> Self {
        Self(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(identifier: &str, radius: f64) -> Region {
        CircularRegion::new(identifier, Coordinate::new(37.1234, -122.4567), radius).into()
    }

    #[test]
    fn test_same_identifier_different_radius_is_not_equal() {
        let before = EquatableRegion::new(circle("zone.home", 50.0));
        let after = EquatableRegion::new(circle("zone.home", 75.0));
        assert_ne!(before, after);

        let set = EquatableRegion::set(&[circle("zone.home", 50.0)]);
        assert!(!set.contains(&after));
        assert!(set.contains(&before));
    }

    #[test]
    fn test_identical_geometry_is_equal() {
        let lhs = EquatableRegion::new(circle("zone.work", 100.0));
        let rhs = EquatableRegion::new(circle("zone.work", 100.0));
        assert_eq!(lhs, rhs);
        assert_eq!(EquatableRegion::set([lhs.region(), rhs.region()]).len(), 1);
    }

    #[test]
    fn test_beacon_and_circle_never_equal() {
        let beacon: Region = BeaconRegion {
            identifier: "zone.home".into(),
            beacon: BeaconIdentity {
                uuid: Uuid::nil(),
                major: None,
                minor: None,
            },
        }
        .into();
        assert_ne!(
            EquatableRegion::new(beacon),
            EquatableRegion::new(circle("zone.home", 50.0))
        );
    }

    #[test]
    fn test_negative_zero_matches_zero() {
        let lhs: Region = CircularRegion::new("z", Coordinate::new(0.0, 1.0), 10.0).into();
        let rhs: Region = CircularRegion::new("z", Coordinate::new(-0.0, 1.0), 10.0).into();
        assert_eq!(EquatableRegion::set([&lhs, &rhs]).len(), 1);
    }

    #[test]
    fn test_contains_with_accuracy() {
        let region = CircularRegion::new("z", Coordinate::new(37.0, -122.0), 100.0);
        let outside = region.center.moving(150.0, 0.0);
        let now = chrono::Utc::now();

        assert!(!region.contains(&outside));
        assert!(!region.contains_with_accuracy(&Location::new(outside, 10.0, now)));
        assert!(region.contains_with_accuracy(&Location::new(outside, 60.0, now)));
        assert!((region.distance_with_accuracy(&Location::new(outside, 10.0, now)) - 40.0).abs() < 0.01);
    }

    #[test]
    fn test_region_serialization_is_tagged() {
        let json = serde_json::to_string(&circle("zone.home", 50.0)).unwrap();
        assert!(json.contains("\"kind\":\"circular\""));
        let back: Region = serde_json::from_str(&json).unwrap();
        assert_eq!(back.identifier(), "zone.home");
    }
}
