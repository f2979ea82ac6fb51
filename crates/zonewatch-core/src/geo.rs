//! Coordinates, location fixes and the spherical geometry used by region checks.
//!
//! Distances use the haversine formula over a mean Earth radius, which is
//! what the region containment checks and the coordinate-moving heuristics
//! both rely on. See <https://www.movable-type.co.uk/scripts/latlong.html>.

use std::f64::consts::PI;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let delta_phi = (other.latitude - self.latitude).to_radians();
        let delta_lambda = (other.longitude - self.longitude).to_radians();

        let a = (delta_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }

    /// Initial bearing toward `destination`, in radians normalized to `[0, 2π)`.
    #[must_use]
    pub fn bearing_to(&self, destination: &Self) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = destination.latitude.to_radians();
        let delta_lambda = (destination.longitude - self.longitude).to_radians();

        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
        let y = delta_lambda.sin() * phi2.cos();
        let theta = y.atan2(x);

        if theta < 0.0 {
            theta + 2.0 * PI
        } else {
            theta
        }
    }

    /// The point reached by travelling `distance` meters along `bearing` (radians).
    #[must_use]
    pub fn moving(&self, distance: f64, bearing: f64) -> Self {
        let delta = distance / EARTH_RADIUS_METERS;
        let phi1 = self.latitude.to_radians();
        let lambda1 = self.longitude.to_radians();

        let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * bearing.cos();
        let phi2 = sin_phi2.asin();
        let y = bearing.sin() * delta.sin() * phi1.cos();
        let x = delta.cos() - phi1.sin() * sin_phi2;
        let lambda2 = lambda1 + y.atan2(x);

        Self {
            latitude: phi2.to_degrees(),
            longitude: lambda2.to_degrees(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// A single location fix as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Position of the fix.
    pub coordinate: Coordinate,

    /// Radius of uncertainty around `coordinate`, in meters.
    pub horizontal_accuracy: f64,

    /// Altitude in meters, if known.
    #[serde(default)]
    pub altitude: Option<f64>,

    /// Vertical accuracy in meters, if known.
    #[serde(default)]
    pub vertical_accuracy: Option<f64>,

    /// Speed in meters per second, if known.
    #[serde(default)]
    pub speed: Option<f64>,

    /// Course in degrees from true north, if known.
    #[serde(default)]
    pub course: Option<f64>,

    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a fix with only a coordinate, accuracy and timestamp.
    #[must_use]
    pub fn new(coordinate: Coordinate, horizontal_accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            horizontal_accuracy,
            altitude: None,
            vertical_accuracy: None,
            speed: None,
            course: None,
            timestamp,
        }
    }

    /// Distance between the two fixes' coordinates in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }

    /// How long ago the fix was taken, relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.timestamp)
    }

    /// Copy of this fix with the accuracy radius grown by `amount` plus one meter.
    #[must_use]
    pub fn increasing_accuracy(&self, amount: f64) -> Self {
        Self {
            horizontal_accuracy: self.horizontal_accuracy + amount + 1.0,
            ..self.clone()
        }
    }

    /// Copy of this fix placed at `coordinate`, everything else unchanged.
    #[must_use]
    pub fn changing_coordinate(&self, coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            ..self.clone()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} +/- {:.1}m at {}",
            self.coordinate,
            self.horizontal_accuracy,
            self.timestamp.to_rfc3339()
        )
    }
}
