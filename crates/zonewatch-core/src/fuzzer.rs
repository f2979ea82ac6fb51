//! Accuracy fuzzing: reconciling "the platform says inside" with "GPS says outside".
//!
//! Each fuzzer looks at a fix and the event that produced it and either
//! leaves the fix alone or proposes one [`Adjustment`]. The chain applies them
//! left to right, each fuzzer seeing the previous one's output. Every fuzzer's
//! guard is false once its own adjustment has been applied, so running the
//! chain on its own output changes nothing.

use crate::event::{Event, EventKind};
use crate::geo::{Coordinate, Location};
use crate::region::{Region, RegionState};
use crate::zone::{RegionGeometry, Zone};

/// A correction to a location fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Grow the accuracy radius by this many meters (plus one).
    IncreaseAccuracy(f64),
    /// Move the fix to this coordinate.
    ReplaceCoordinate(Coordinate),
}

impl Adjustment {
    /// Apply to `location`.
    #[must_use]
    pub fn apply(&self, location: &Location) -> Location {
        match *self {
            Self::IncreaseAccuracy(distance) => location.increasing_accuracy(distance),
            Self::ReplaceCoordinate(coordinate) => location.changing_coordinate(coordinate),
        }
    }
}

/// What fuzzers may consult besides the fix and the event.
#[derive(Debug, Clone, Copy)]
pub struct FuzzContext<'a> {
    /// Every known zone.
    pub zones: &'a [Zone],
    /// How zones expand into monitored circles.
    pub geometry: &'a RegionGeometry,
}

/// A single correction heuristic.
pub trait AccuracyFuzzer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The adjustment to apply, or `None` if the fix is already consistent.
    fn adjustment(&self, location: &Location, event: &Event, context: &FuzzContext<'_>)
        -> Option<Adjustment>;
}

/// Entered a circular region whose circle the fix (with accuracy) doesn't reach.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionEnterFuzzer;

impl AccuracyFuzzer for RegionEnterFuzzer {
    fn name(&self) -> &'static str {
        "region-enter"
    }

    fn adjustment(&self, location: &Location, event: &Event, _: &FuzzContext<'_>) -> Option<Adjustment> {
        let EventKind::RegionStateChange {
            region: Region::Circular(region),
            state: RegionState::Inside,
        } = &event.kind
        else {
            return None;
        };

        let distance = region.distance_with_accuracy(location);
        (distance > 0.0).then_some(Adjustment::IncreaseAccuracy(distance))
    }
}

/// Inside the overlap of a small zone's monitored circles but not its nominal circle.
///
/// A small zone is monitored with several larger circles, and the platform
/// reports inside once the fix is in all of them, which can still be outside
/// the zone itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiRegionFuzzer;

impl AccuracyFuzzer for MultiRegionFuzzer {
    fn name(&self) -> &'static str {
        "multi-region"
    }

    fn adjustment(&self, location: &Location, event: &Event, context: &FuzzContext<'_>) -> Option<Adjustment> {
        let zone = event.associated_zone.as_ref()?;
        let regions = zone.circular_regions_for_monitoring(context.geometry);
        if regions.len() < 2 || !regions.iter().all(|region| region.contains_with_accuracy(location)) {
            return None;
        }

        let distance = zone.circular_region().distance_with_accuracy(location);
        (distance > 0.0).then_some(Adjustment::IncreaseAccuracy(distance))
    }
}

/// Entered a small zone nested inside another zone, with the literal point outside it.
///
/// When zones nest, the server decides which one the device is in from the
/// coordinate alone, so a fix whose accuracy circle reaches the small zone but
/// whose point sits in the enclosing zone gets attributed to the wrong place.
/// The point is moved along the line to the zone center until it is one meter
/// inside the zone. Zones that merely touch or overlap are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiZoneFuzzer;

impl AccuracyFuzzer for MultiZoneFuzzer {
    fn name(&self) -> &'static str {
        "multi-zone"
    }

    fn adjustment(&self, location: &Location, event: &Event, context: &FuzzContext<'_>) -> Option<Adjustment> {
        let EventKind::RegionStateChange {
            state: RegionState::Inside,
            ..
        } = &event.kind
        else {
            return None;
        };
        let zone = event.associated_zone.as_ref()?;

        if zone.circular_regions_for_monitoring(context.geometry).len() < 2
            || !zone.contains_in_regions(location, context.geometry)
        {
            return None;
        }

        let coordinate = location.coordinate;
        let outside_by = zone.center.distance_to(&coordinate) - zone.radius;
        if outside_by <= 0.0 {
            return None;
        }

        let nested_in_other = context
            .zones
            .iter()
            .filter(|other| other.id != zone.id)
            .any(|other| {
                other.center.distance_to(&zone.center) + zone.radius <= other.radius
                    && other.circular_region().contains(&coordinate)
            });
        if !nested_in_other {
            return None;
        }

        let bearing = coordinate.bearing_to(&zone.center);
        Some(Adjustment::ReplaceCoordinate(
            coordinate.moving(outside_by + 1.0, bearing),
        ))
    }
}

/// Ordered list of fuzzers reduced over a fix.
pub struct FuzzerChain {
    fuzzers: Vec<Box<dyn AccuracyFuzzer>>,
}

impl FuzzerChain {
    /// A chain of exactly these fuzzers, in order.
    #[must_use]
    pub fn new(fuzzers: Vec<Box<dyn AccuracyFuzzer>>) -> Self {
        Self { fuzzers }
    }

    /// Run every fuzzer in order, each seeing the previous output.
    #[must_use]
    pub fn sanitize(&self, location: &Location, event: &Event, context: &FuzzContext<'_>) -> Location {
        self.fuzzers.iter().fold(location.clone(), |current, fuzzer| {
            match fuzzer.adjustment(&current, event, context) {
                Some(adjustment) => {
                    tracing::debug!(fuzzer = fuzzer.name(), ?adjustment, "adjusting location");
                    adjustment.apply(&current)
                }
                None => current,
            }
        })
    }
}

impl Default for FuzzerChain {
    /// Region-enter, then multi-region, then multi-zone.
    fn default() -> Self {
        Self::new(vec![
            Box::new(RegionEnterFuzzer),
            Box::new(MultiRegionFuzzer),
            Box::new(MultiZoneFuzzer),
        ])
    }
}

impl std::fmt::Debug for FuzzerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.fuzzers.iter().map(|fuzzer| fuzzer.name()))
            .finish()
    }
}
