//! Monitored region API endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::{Region, RegionMonitor, SyncReport};

use crate::state::SharedState;

/// Creates the regions router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_regions))
        .route("/sync", post(sync_regions))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A monitored region.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "identifier": "zone.home@120",
    "kind": "circular",
    "latitude": 37.1229,
    "longitude": -122.4563,
    "radius": 100.0
}))]
pub struct RegionBody {
    /// Identifier the monitoring service keys the region by.
    #[schema(example = "zone.home@120")]
    pub identifier: String,

    /// `circular` or `beacon`.
    #[schema(example = "circular")]
    pub kind: String,

    /// Center latitude of a circular region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// Center longitude of a circular region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Radius in meters of a circular region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,

    /// Proximity UUID of a beacon region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Major value of a beacon region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<u16>,

    /// Minor value of a beacon region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<u16>,
}

impl From<&Region> for RegionBody {
    fn from(region: &Region) -> Self {
        match region {
            Region::Circular(circle) => Self {
                identifier: circle.identifier.clone(),
                kind: "circular".to_string(),
                latitude: Some(circle.center.latitude),
                longitude: Some(circle.center.longitude),
                radius: Some(circle.radius),
                uuid: None,
                major: None,
                minor: None,
            },
            Region::Beacon(beacon) => Self {
                identifier: beacon.identifier.clone(),
                kind: "beacon".to_string(),
                latitude: None,
                longitude: None,
                radius: None,
                uuid: Some(beacon.beacon.uuid.to_string()),
                major: beacon.beacon.major,
                minor: beacon.beacon.minor,
            },
        }
    }
}

/// Monitored regions and the limits they live under.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegionsResponse {
    /// Regions currently monitored, sorted by identifier.
    pub regions: Vec<RegionBody>,

    /// Number of beacon regions.
    pub beacon_count: usize,

    /// Number of circular regions.
    pub circular_count: usize,

    /// Ceiling on beacon regions.
    pub beacon_limit: usize,

    /// Ceiling on circular regions.
    pub circular_limit: usize,
}

/// Outcome of a sync.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// Regions whose monitoring started.
    pub added: Vec<String>,

    /// Regions whose monitoring ended.
    pub removed: Vec<String>,

    /// Regions the monitoring service refused.
    pub failed: Vec<String>,
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            added: report.added,
            removed: report.removed,
            failed: report.failed,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List monitored regions.
#[utoipa::path(
    get,
    path = "/api/regions",
    tag = "regions",
    operation_id = "listRegions",
    summary = "List monitored regions",
    description = "Returns the regions the monitoring service is currently asked to watch. \
        Small zones appear as several circles suffixed with their bearing.",
    responses(
        (status = 200, description = "Regions retrieved", body = RegionsResponse)
    )
)]
pub async fn list_regions(State(state): State<SharedState>) -> Json<RegionsResponse> {
    let mut regions = state.monitor().monitored_regions();
    regions.sort_by(|lhs, rhs| lhs.identifier().cmp(rhs.identifier()));

    let beacon_count = regions.iter().filter(|region| region.is_beacon()).count();
    let monitoring = &state.config().monitoring;

    Json(RegionsResponse {
        beacon_count,
        circular_count: regions.len() - beacon_count,
        beacon_limit: monitoring.beacon_limit,
        circular_limit: monitoring.circular_limit,
        regions: regions.iter().map(RegionBody::from).collect(),
    })
}

/// Resync monitored regions.
#[utoipa::path(
    post,
    path = "/api/regions/sync",
    tag = "regions",
    operation_id = "syncRegions",
    summary = "Resync monitored regions",
    description = "Recomputes the desired regions from the zones and applies the difference, \
        ending stale regions before starting new ones.",
    responses(
        (status = 200, description = "Sync finished", body = SyncResponse)
    )
)]
pub async fn sync_regions(State(state): State<SharedState>) -> Json<SyncResponse> {
    Json(state.coordinator().sync().await.into())
}
