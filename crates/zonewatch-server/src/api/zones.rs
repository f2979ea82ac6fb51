//! Zone management API endpoints.
//!
//! Zones are the source of every monitored region. Changing one here is
//! picked up by the coordinator, which resyncs the monitored regions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::{Coordinate, Zone, ZoneBeacon, ZoneChange, ZoneStore};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

static ZONE_ID_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^zone\.[a-z0-9_]+$").ok());

fn is_valid_zone_id(id: &str) -> bool {
    ZONE_ID_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(id))
}

/// Creates the zones router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_zones))
        .route("/{id}", get(get_zone).put(put_zone).delete(delete_zone))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Beacon identity of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BeaconBody {
    /// Proximity UUID.
    #[schema(example = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0")]
    pub uuid: String,

    /// Major value.
    #[schema(example = 1)]
    pub major: Option<u16>,

    /// Minor value, only used with a major value.
    #[schema(example = 2)]
    pub minor: Option<u16>,
}

/// A stored zone.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "zone.home",
    "name": "Home",
    "latitude": 37.1234,
    "longitude": -122.4567,
    "radius": 50.0,
    "tracking_enabled": true,
    "ssid_filter": [],
    "beacon": null,
    "in_region": false,
    "is_passive": false
}))]
pub struct ZoneBody {
    /// Entity identifier.
    #[schema(example = "zone.home")]
    pub id: String,

    /// Friendly name.
    pub name: Option<String>,

    /// Center latitude in degrees.
    pub latitude: f64,

    /// Center longitude in degrees.
    pub longitude: f64,

    /// Radius in meters.
    pub radius: f64,

    /// Whether region events for this zone are acted on.
    pub tracking_enabled: bool,

    /// Networks that suppress transitions for this zone.
    pub ssid_filter: Vec<String>,

    /// Beacon identity.
    pub beacon: Option<BeaconBody>,

    /// Last known membership.
    pub in_region: bool,

    /// Passive zones are never reported as the device location.
    pub is_passive: bool,
}

impl From<Zone> for ZoneBody {
    fn from(zone: Zone) -> Self {
        Self {
            id: zone.id,
            name: zone.name,
            latitude: zone.center.latitude,
            longitude: zone.center.longitude,
            radius: zone.radius,
            tracking_enabled: zone.tracking_enabled,
            ssid_filter: zone.ssid_filter,
            beacon: zone.beacon.map(|beacon| BeaconBody {
                uuid: beacon.uuid,
                major: beacon.major,
                minor: beacon.minor,
            }),
            in_region: zone.in_region,
            is_passive: zone.is_passive,
        }
    }
}

/// Request to create or replace a zone.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Home",
    "latitude": 37.1234,
    "longitude": -122.4567,
    "radius": 50.0
}))]
pub struct ZoneRequest {
    /// Friendly name.
    #[serde(default)]
    pub name: Option<String>,

    /// Center latitude in degrees (-90 to 90).
    pub latitude: f64,

    /// Center longitude in degrees (-180 to 180).
    pub longitude: f64,

    /// Radius in meters, greater than zero.
    pub radius: f64,

    /// Whether region events are acted on. Defaults to true.
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,

    /// Networks that suppress transitions.
    #[serde(default)]
    pub ssid_filter: Vec<String>,

    /// Beacon identity.
    #[serde(default)]
    pub beacon: Option<BeaconBody>,

    /// Never report this zone as the device location.
    #[serde(default)]
    pub is_passive: bool,
}

const fn default_true() -> bool {
    true
}

impl ZoneRequest {
    fn validate(&self, id: &str) -> ApiResult<()> {
        if !is_valid_zone_id(id) {
            return Err(ApiError::bad_request(
                "invalid_zone_id",
                format!("Zone identifiers look like zone.home, got '{id}'"),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ApiError::bad_request(
                "invalid_coordinate",
                "Latitude must be within ±90 and longitude within ±180",
            ));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ApiError::bad_request(
                "invalid_radius",
                "Radius must be a positive number of meters",
            ));
        }
        if let Some(beacon) = &self.beacon {
            if uuid::Uuid::parse_str(&beacon.uuid).is_err() {
                return Err(ApiError::bad_request(
                    "invalid_beacon_uuid",
                    format!("'{}' is not a valid beacon UUID", beacon.uuid),
                ));
            }
        }
        Ok(())
    }

    fn into_zone(self, id: String, in_region: bool) -> Zone {
        Zone {
            name: self.name,
            tracking_enabled: self.tracking_enabled,
            ssid_filter: self.ssid_filter,
            beacon: self.beacon.map(|beacon| ZoneBeacon {
                uuid: beacon.uuid,
                major: beacon.major,
                minor: beacon.minor,
            }),
            in_region,
            is_passive: self.is_passive,
            ..Zone::new(id, Coordinate::new(self.latitude, self.longitude), self.radius)
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List zones.
#[utoipa::path(
    get,
    path = "/api/zones",
    tag = "zones",
    operation_id = "listZones",
    summary = "List zones",
    description = "Returns every stored zone, including ones with tracking disabled.",
    responses(
        (status = 200, description = "Zones retrieved", body = [ZoneBody])
    )
)]
pub async fn list_zones(State(state): State<SharedState>) -> Json<Vec<ZoneBody>> {
    Json(state.zones().zones().into_iter().map(ZoneBody::from).collect())
}

/// Get a zone.
#[utoipa::path(
    get,
    path = "/api/zones/{id}",
    tag = "zones",
    operation_id = "getZone",
    summary = "Get a zone",
    params(("id" = String, Path, description = "Zone identifier, e.g. zone.home")),
    responses(
        (status = 200, description = "Zone retrieved", body = ZoneBody),
        (status = 404, description = "No such zone", body = ErrorResponse)
    )
)]
pub async fn get_zone(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ZoneBody>> {
    state
        .zones()
        .zone(&id)
        .map(|zone| Json(zone.into()))
        .ok_or_else(|| ApiError::not_found("zone_not_found", format!("Zone not found: '{id}'")))
}

/// Create or replace a zone.
#[utoipa::path(
    put,
    path = "/api/zones/{id}",
    tag = "zones",
    operation_id = "putZone",
    summary = "Create or replace a zone",
    description = "Stores the zone and resyncs monitored regions. Replacing a zone keeps \
        its last known membership.",
    params(("id" = String, Path, description = "Zone identifier, e.g. zone.home")),
    request_body = ZoneRequest,
    responses(
        (status = 200, description = "Zone replaced", body = ZoneBody),
        (status = 201, description = "Zone created", body = ZoneBody),
        (status = 400, description = "Invalid zone", body = ErrorResponse)
    )
)]
pub async fn put_zone(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ZoneRequest>,
) -> ApiResult<(StatusCode, Json<ZoneBody>)> {
    request.validate(&id)?;

    let in_region = state.zones().zone(&id).is_some_and(|zone| zone.in_region);
    let zone = request.into_zone(id, in_region);
    let change = state.zones().upsert(zone.clone())?;
    state.persist_zones()?;

    let status = match change {
        ZoneChange::Inserted(_) => StatusCode::CREATED,
        ZoneChange::Updated(_) | ZoneChange::Deleted(_) => StatusCode::OK,
    };
    tracing::info!(zone = %zone.id, ?change, "zone stored");
    Ok((status, Json(zone.into())))
}

/// Delete a zone.
#[utoipa::path(
    delete,
    path = "/api/zones/{id}",
    tag = "zones",
    operation_id = "deleteZone",
    summary = "Delete a zone",
    description = "Removes the zone; its regions stop being monitored on the next sync.",
    params(("id" = String, Path, description = "Zone identifier, e.g. zone.home")),
    responses(
        (status = 204, description = "Zone deleted"),
        (status = 404, description = "No such zone", body = ErrorResponse)
    )
)]
pub async fn delete_zone(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.zones().remove(&id)?;
    state.persist_zones()?;
    tracing::info!(zone = %id, "zone deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ZoneRequest {
        serde_json::from_str(r#"{"latitude": 37.1, "longitude": -122.4, "radius": 50.0}"#).unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let request = request();
        assert!(request.tracking_enabled);
        assert!(request.ssid_filter.is_empty());
        assert!(!request.is_passive);
    }

    #[test]
    fn test_zone_id_validation() {
        assert!(request().validate("zone.home").is_ok());
        assert!(request().validate("zone.my_place_2").is_ok());
        assert!(request().validate("home").is_err());
        assert!(request().validate("zone.Home").is_err());
        assert!(request().validate("zone.cafe@120").is_err());
    }

    #[test]
    fn test_radius_and_coordinate_validation() {
        let mut bad = request();
        bad.radius = 0.0;
        assert!(bad.validate("zone.home").is_err());

        let mut bad = request();
        bad.latitude = 91.0;
        assert!(bad.validate("zone.home").is_err());
    }

    #[test]
    fn test_invalid_beacon_rejected() {
        let mut bad = request();
        bad.beacon = Some(BeaconBody {
            uuid: "nope".into(),
            major: None,
            minor: None,
        });
        assert!(bad.validate("zone.home").is_err());
    }

    #[test]
    fn test_zone_body_round_trips_fields() {
        let zone = request().into_zone("zone.home".into(), true);
        let body = ZoneBody::from(zone);
        assert_eq!(body.id, "zone.home");
        assert!(body.in_region);
        assert!((body.radius - 50.0).abs() < f64::EPSILON);
    }
}
