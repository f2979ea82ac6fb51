//! Choosing which regions to monitor under the platform's region ceiling.
//!
//! The platform caps how many beacon and circular regions may be monitored at
//! once. When the zones want more than that, whole zones are dropped starting
//! from the one farthest from a reference point (the last known location,
//! else the home zone), or the largest one when there is no reference point.
//! A kept zone always keeps all of its regions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{ClientEvent, ClientEventKind, DiagnosticSink};
use crate::geo::{Coordinate, Location};
use crate::region::{EquatableRegion, Region, RegionKind};
use crate::zone::{RegionGeometry, Zone};

/// Default ceiling on monitored beacon regions.
pub const DEFAULT_BEACON_LIMIT: usize = 20;

/// Default ceiling on monitored circular regions.
pub const DEFAULT_CIRCULAR_LIMIT: usize = 20;

/// Independent per-kind ceilings. A count equal to its limit is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLimits {
    /// Maximum beacon regions.
    pub beacon: usize,
    /// Maximum circular regions.
    pub circular: usize,
}

impl Default for RegionLimits {
    fn default() -> Self {
        Self {
            beacon: DEFAULT_BEACON_LIMIT,
            circular: DEFAULT_CIRCULAR_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    beacon: usize,
    circular: usize,
}

impl Counts {
    fn of<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Self {
        regions.into_iter().fold(Self::default(), |mut counts, region| {
            match region.kind() {
                RegionKind::Beacon => counts.beacon += 1,
                RegionKind::Circular => counts.circular += 1,
            }
            counts
        })
    }

    const fn subtract(self, other: Self) -> Self {
        Self {
            beacon: self.beacon.saturating_sub(other.beacon),
            circular: self.circular.saturating_sub(other.circular),
        }
    }

    const fn beacon_over(self, limits: RegionLimits) -> bool {
        self.beacon > limits.beacon
    }

    const fn circular_over(self, limits: RegionLimits) -> bool {
        self.circular > limits.circular
    }
}

/// What the zones were ranked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// Distance from the last known location.
    LastLocation,
    /// Distance from the home zone.
    HomeZone,
    /// No reference point; ranked by radius.
    Radius,
}

impl fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastLocation => "last_location",
            Self::HomeZone => "home_zone",
            Self::Radius => "radius",
        })
    }
}

struct Candidate<'a> {
    zone: &'a Zone,
    regions: Vec<Region>,
    counts: Counts,
    rank: f64,
}

/// Bounded allocator from zones to monitored regions.
#[derive(Clone)]
pub struct RegionSelectionFilter {
    limits: RegionLimits,
    geometry: RegionGeometry,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl RegionSelectionFilter {
    /// Filter with the given ceilings and zone expansion geometry.
    #[must_use]
    pub fn new(limits: RegionLimits, geometry: RegionGeometry) -> Self {
        Self {
            limits,
            geometry,
            diagnostics: None,
        }
    }

    /// Record limit-reached entries to `sink`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Configured ceilings.
    #[must_use]
    pub const fn limits(&self) -> RegionLimits {
        self.limits
    }

    /// Zone expansion geometry.
    #[must_use]
    pub const fn geometry(&self) -> &RegionGeometry {
        &self.geometry
    }

    /// The regions to monitor for `zones`.
    ///
    /// `current_regions` is only used to decide whether a limit-reached
    /// diagnostic is worth recording: nothing is recorded when the selection
    /// matches what is already monitored.
    #[must_use]
    pub fn regions(
        &self,
        zones: &[Zone],
        current_regions: &[Region],
        last_location: Option<&Location>,
    ) -> Vec<Region> {
        let mut candidates: Vec<Candidate<'_>> = zones
            .iter()
            .map(|zone| {
                let regions = zone.regions_for_monitoring(&self.geometry);
                let counts = Counts::of(&regions);
                Candidate {
                    zone,
                    regions,
                    counts,
                    rank: 0.0,
                }
            })
            .collect();

        let start = candidates
            .iter()
            .fold(Counts::default(), |total, candidate| Counts {
                beacon: total.beacon + candidate.counts.beacon,
                circular: total.circular + candidate.counts.circular,
            });

        if !start.beacon_over(self.limits) && !start.circular_over(self.limits) {
            return candidates.into_iter().flat_map(|c| c.regions).collect();
        }

        let (reference, source) = Self::reference_point(zones, last_location);
        for candidate in &mut candidates {
            candidate.rank = reference.map_or(candidate.zone.radius, |point| {
                point.distance_to(&candidate.zone.center)
            });
        }
        // nearest (or smallest) first, so the drop candidates sit at the end
        candidates.sort_by(|lhs, rhs| {
            lhs.rank
                .total_cmp(&rhs.rank)
                .then_with(|| lhs.zone.id.cmp(&rhs.zone.id))
        });

        let mut counts = start;
        let mut dropped = Vec::new();
        loop {
            let beacon_over = counts.beacon_over(self.limits);
            let circular_over = counts.circular_over(self.limits);
            if !beacon_over && !circular_over {
                break;
            }

            let Some(index) = candidates.iter().rposition(|candidate| {
                (beacon_over && candidate.counts.beacon > 0)
                    || (circular_over && candidate.counts.circular > 0)
            }) else {
                break;
            };

            let candidate = candidates.remove(index);
            counts = counts.subtract(candidate.counts);
            dropped.push(candidate.zone.id.clone());
        }

        let selected: Vec<Region> = candidates.into_iter().flat_map(|c| c.regions).collect();

        if EquatableRegion::set(&selected) == EquatableRegion::set(current_regions) {
            tracing::debug!(dropped = dropped.len(), "region limit still reached, selection unchanged");
        } else {
            tracing::warn!(
                zones = zones.len(),
                dropped = dropped.len(),
                reference = %source,
                "region limit reached, not monitoring every zone"
            );
            self.record_limit_reached(start, zones.len(), &dropped, source);
        }

        selected
    }

    fn reference_point(
        zones: &[Zone],
        last_location: Option<&Location>,
    ) -> (Option<Coordinate>, ReferenceSource) {
        if let Some(location) = last_location {
            return (Some(location.coordinate), ReferenceSource::LastLocation);
        }
        if let Some(home) = zones.iter().find(|zone| zone.is_home()) {
            return (Some(home.center), ReferenceSource::HomeZone);
        }
        (None, ReferenceSource::Radius)
    }

    fn record_limit_reached(
        &self,
        start: Counts,
        zone_count: usize,
        dropped: &[String],
        source: ReferenceSource,
    ) {
        let Some(sink) = &self.diagnostics else {
            return;
        };

        sink.record(
            ClientEvent::new(
                format!(
                    "Region monitoring limit reached, not monitoring {} zone(s)",
                    dropped.len()
                ),
                ClientEventKind::RegionMonitoring,
            )
            .with("start_beacon", start.beacon)
            .with("start_circular", start.circular)
            .with("limit_beacon", self.limits.beacon)
            .with("limit_circular", self.limits.circular)
            .with("zones", zone_count)
            .with("dropped", dropped.to_vec())
            .with("reference", source.to_string()),
        );
    }
}

impl Default for RegionSelectionFilter {
    fn default() -> Self {
        Self::new(RegionLimits::default(), RegionGeometry::default())
    }
}

impl fmt::Debug for RegionSelectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionSelectionFilter")
            .field("limits", &self.limits)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}
