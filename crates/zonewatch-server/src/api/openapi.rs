//! OpenAPI specification generation for the zonewatch API.
//!
//! The document describes every endpoint so device-side clients can be
//! generated from it.

use axum::Json;
use utoipa::OpenApi;

use super::callbacks::{
    CallbackResponse, ErrorRequest, LocationBody, LocationsRequest, RegionStateBody,
    RegionStateRequest, StartedRequest,
};
use super::connectivity::ConnectivityBody;
use super::error::ErrorResponse;
use super::events::{EventBody, EventKindBody};
use super::health::HealthResponse;
use super::regions::{RegionBody, RegionsResponse, SyncResponse};
use super::settings::{LocationSourcesBody, LocationSourcesResponse};
use super::zones::{BeaconBody, ZoneBody, ZoneRequest};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty-printed string.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for zonewatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "zonewatch API",
        version = "0.1.0",
        description = r#"
# zonewatch API

zonewatch decides which geofences a device should monitor and turns region
callbacks into location updates for a Home Assistant server.

## Overview

1. **Zones**: the places to watch. Zones smaller than the platform's reliable
   radius are covered by several larger circles.
2. **Regions**: what is actually monitored, kept under per-kind limits by
   dropping the zones farthest from the device.
3. **Callbacks**: the device reports region states and location fixes here.
   Each one is filtered, its location adjusted to agree with the event, and
   submitted to the webhook.
4. **Events**: a diagnostic history of what happened and why.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local zonewatch server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "zones", description = "Zone management"),
        (name = "regions", description = "Monitored regions and resync"),
        (name = "callbacks", description = "Region-monitoring callbacks from the device"),
        (name = "settings", description = "Location source settings"),
        (name = "events", description = "Diagnostic history")
    ),
    paths(
        super::health::health_check,
        super::zones::list_zones,
        super::zones::get_zone,
        super::zones::put_zone,
        super::zones::delete_zone,
        super::regions::list_regions,
        super::regions::sync_regions,
        super::callbacks::region_state,
        super::callbacks::locations,
        super::callbacks::started_monitoring,
        super::callbacks::monitoring_error,
        super::connectivity::update_connectivity,
        super::settings::get_location_sources,
        super::settings::update_location_sources,
        super::events::list_events,
        super::events::clear_events,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ZoneBody,
            ZoneRequest,
            BeaconBody,
            RegionBody,
            RegionsResponse,
            SyncResponse,
            RegionStateBody,
            RegionStateRequest,
            LocationBody,
            LocationsRequest,
            StartedRequest,
            ErrorRequest,
            CallbackResponse,
            ConnectivityBody,
            LocationSourcesBody,
            LocationSourcesResponse,
            EventBody,
            EventKindBody,
        )
    )
)]
pub struct ApiDoc;
