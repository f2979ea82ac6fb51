//! Connectivity API endpoint.
//!
//! Zones can list Wi-Fi networks that suppress their transitions; the device
//! reports which one it is on here.

use axum::extract::State;
use axum::routing::put;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::Connectivity;

use crate::state::SharedState;

/// Creates the connectivity router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", put(update_connectivity))
}

/// The device's current network.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "ssid": "home-wifi"
}))]
pub struct ConnectivityBody {
    /// Wi-Fi SSID, null or empty when not on Wi-Fi.
    #[schema(example = "home-wifi", nullable)]
    pub ssid: Option<String>,
}

/// Report the current network.
#[utoipa::path(
    put,
    path = "/api/connectivity",
    tag = "callbacks",
    operation_id = "updateConnectivity",
    summary = "Report current network",
    description = "Records the SSID the device is connected to. Region events for zones \
        listing this SSID are ignored.",
    request_body = ConnectivityBody,
    responses(
        (status = 200, description = "Network recorded", body = ConnectivityBody)
    )
)]
pub async fn update_connectivity(
    State(state): State<SharedState>,
    Json(request): Json<ConnectivityBody>,
) -> Json<ConnectivityBody> {
    state.connectivity().report(request.ssid);
    Json(ConnectivityBody {
        ssid: state.connectivity().current_ssid(),
    })
}
