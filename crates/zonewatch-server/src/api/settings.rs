//! Location settings API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::LocationSources;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::regions::SyncResponse;
use crate::state::SharedState;

/// Creates the settings router.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/location-sources",
        get(get_location_sources).put(update_location_sources),
    )
}

/// Which location sources are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "zone": true,
    "significant_location_change": true
}))]
pub struct LocationSourcesBody {
    /// Monitor zone regions.
    pub zone: bool,

    /// Monitor significant location changes.
    pub significant_location_change: bool,
}

impl From<LocationSources> for LocationSourcesBody {
    fn from(sources: LocationSources) -> Self {
        Self {
            zone: sources.zone,
            significant_location_change: sources.significant_location_change,
        }
    }
}

impl From<LocationSourcesBody> for LocationSources {
    fn from(body: LocationSourcesBody) -> Self {
        Self {
            zone: body.zone,
            significant_location_change: body.significant_location_change,
        }
    }
}

/// Sources after an update and what the resync changed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocationSourcesResponse {
    /// Enabled sources.
    pub sources: LocationSourcesBody,

    /// Regions started and ended by the resync.
    pub sync: SyncResponse,
}

/// Get enabled location sources.
#[utoipa::path(
    get,
    path = "/api/settings/location-sources",
    tag = "settings",
    operation_id = "getLocationSources",
    summary = "Get location sources",
    responses(
        (status = 200, description = "Sources retrieved", body = LocationSourcesBody)
    )
)]
pub async fn get_location_sources(State(state): State<SharedState>) -> Json<LocationSourcesBody> {
    Json(state.coordinator().location_sources().into())
}

/// Update enabled location sources.
#[utoipa::path(
    put,
    path = "/api/settings/location-sources",
    tag = "settings",
    operation_id = "updateLocationSources",
    summary = "Update location sources",
    description = "Enables or disables zone monitoring and significant location changes. \
        Disabling zones ends every monitored region.",
    request_body = LocationSourcesBody,
    responses(
        (status = 200, description = "Sources updated", body = LocationSourcesResponse),
        (status = 503, description = "Monitoring service rejected the settings", body = ErrorResponse)
    )
)]
pub async fn update_location_sources(
    State(state): State<SharedState>,
    Json(request): Json<LocationSourcesBody>,
) -> ApiResult<Json<LocationSourcesResponse>> {
    let report = state
        .coordinator()
        .location_settings_changed(request.into())
        .await?;

    Ok(Json(LocationSourcesResponse {
        sources: request,
        sync: report.into(),
    }))
}
