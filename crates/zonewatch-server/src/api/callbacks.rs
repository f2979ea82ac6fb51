//! Region-monitoring callback endpoints.
//!
//! The device forwards what its monitoring service reports here. Each
//! callback goes through the coordinator exactly as an in-process callback
//! would; processing continues after the response unless `?wait=true`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use zonewatch_core::{Coordinate, Location, MonitorCallback, Region, RegionMonitor, RegionState};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the callbacks router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/region-state", post(region_state))
        .route("/locations", post(locations))
        .route("/started", post(started_monitoring))
        .route("/error", post(monitoring_error))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// State of a region as reported by the monitoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegionStateBody {
    /// The device is inside.
    Inside,
    /// The device is outside.
    Outside,
    /// The service could not tell.
    Unknown,
}

impl From<RegionStateBody> for RegionState {
    fn from(state: RegionStateBody) -> Self {
        match state {
            RegionStateBody::Inside => Self::Inside,
            RegionStateBody::Outside => Self::Outside,
            RegionStateBody::Unknown => Self::Unknown,
        }
    }
}

/// A region state was determined.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "region": "zone.home@120",
    "state": "inside"
}))]
pub struct RegionStateRequest {
    /// Identifier of a monitored region.
    #[schema(example = "zone.home@120")]
    pub region: String,

    /// Determined state.
    pub state: RegionStateBody,
}

/// A location fix.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "latitude": 37.1234,
    "longitude": -122.4567,
    "horizontal_accuracy": 12.0,
    "timestamp": "2024-05-01T08:30:00Z"
}))]
pub struct LocationBody {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Horizontal accuracy in meters.
    pub horizontal_accuracy: f64,

    /// Altitude in meters.
    #[serde(default)]
    pub altitude: Option<f64>,

    /// Vertical accuracy in meters.
    #[serde(default)]
    pub vertical_accuracy: Option<f64>,

    /// Speed in meters per second.
    #[serde(default)]
    pub speed: Option<f64>,

    /// Course in degrees.
    #[serde(default)]
    pub course: Option<f64>,

    /// When the fix was taken. Defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<LocationBody> for Location {
    fn from(body: LocationBody) -> Self {
        Self {
            altitude: body.altitude,
            vertical_accuracy: body.vertical_accuracy,
            speed: body.speed,
            course: body.course,
            ..Self::new(
                Coordinate::new(body.latitude, body.longitude),
                body.horizontal_accuracy,
                body.timestamp.unwrap_or_else(Utc::now),
            )
        }
    }
}

/// New location fixes, newest last.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LocationsRequest {
    /// The fixes.
    pub locations: Vec<LocationBody>,
}

/// Monitoring of a region started.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StartedRequest {
    /// Identifier of a monitored region.
    #[schema(example = "zone.home")]
    pub region: String,
}

/// The monitoring service reported an error.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "message": "region monitoring unavailable",
    "region": "zone.home"
}))]
pub struct ErrorRequest {
    /// Error text from the service.
    pub message: String,

    /// The region the error is about, if any.
    #[serde(default)]
    pub region: Option<String>,
}

/// Options for callback handling.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct CallbackOptions {
    /// Respond only after the resulting event has been processed.
    #[serde(default)]
    pub wait: bool,
}

/// Whether the callback produced an event to process.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallbackResponse {
    /// An event was created from the callback.
    pub event_created: bool,

    /// The event finished processing before this response.
    pub processed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

fn monitored_region(state: &SharedState, identifier: &str) -> ApiResult<Region> {
    state
        .monitor()
        .monitored_regions()
        .into_iter()
        .find(|region| region.identifier() == identifier)
        .ok_or_else(|| {
            ApiError::not_found(
                "region_not_monitored",
                format!("Region is not monitored: '{identifier}'"),
            )
        })
}

async fn dispatch(
    state: &SharedState,
    callback: MonitorCallback,
    options: CallbackOptions,
) -> ApiResult<(StatusCode, Json<CallbackResponse>)> {
    let Some(handle) = state.coordinator().process_callback(callback) else {
        return Ok((
            StatusCode::OK,
            Json(CallbackResponse {
                event_created: false,
                processed: false,
            }),
        ));
    };

    if !options.wait {
        return Ok((
            StatusCode::ACCEPTED,
            Json(CallbackResponse {
                event_created: true,
                processed: false,
            }),
        ));
    }

    handle.await.map_err(|e| ApiError::InternalError {
        error_code: "event_processing_panicked".to_string(),
        message: "Event processing did not complete".to_string(),
        details: Some(e.to_string()),
    })?;

    Ok((
        StatusCode::OK,
        Json(CallbackResponse {
            event_created: true,
            processed: true,
        }),
    ))
}

/// Report a determined region state.
#[utoipa::path(
    post,
    path = "/api/callbacks/region-state",
    tag = "callbacks",
    operation_id = "reportRegionState",
    summary = "Report a region state",
    description = "Feeds an enter, exit or unknown state for a monitored region into the \
        event pipeline. The first state after a region starts being monitored is swallowed.",
    params(CallbackOptions),
    request_body = RegionStateRequest,
    responses(
        (status = 200, description = "Handled", body = CallbackResponse),
        (status = 202, description = "Event accepted for processing", body = CallbackResponse),
        (status = 404, description = "Region is not monitored", body = ErrorResponse)
    )
)]
pub async fn region_state(
    State(state): State<SharedState>,
    Query(options): Query<CallbackOptions>,
    Json(request): Json<RegionStateRequest>,
) -> ApiResult<(StatusCode, Json<CallbackResponse>)> {
    let region = monitored_region(&state, &request.region)?;
    let callback = MonitorCallback::DeterminedState {
        region,
        state: request.state.into(),
    };
    dispatch(&state, callback, options).await
}

/// Report new location fixes.
#[utoipa::path(
    post,
    path = "/api/callbacks/locations",
    tag = "callbacks",
    operation_id = "reportLocations",
    summary = "Report location fixes",
    description = "Feeds a batch of fixes, newest last, into the event pipeline. The newest \
        fix also becomes the last known location.",
    params(CallbackOptions),
    request_body = LocationsRequest,
    responses(
        (status = 200, description = "Handled", body = CallbackResponse),
        (status = 202, description = "Event accepted for processing", body = CallbackResponse)
    )
)]
pub async fn locations(
    State(state): State<SharedState>,
    Query(options): Query<CallbackOptions>,
    Json(request): Json<LocationsRequest>,
) -> ApiResult<(StatusCode, Json<CallbackResponse>)> {
    let locations: Vec<Location> = request.locations.into_iter().map(Location::from).collect();

    if let Some(newest) = locations.last() {
        state.locator().report(newest);
        state.monitor().set_last_location(Some(newest.clone()));
    }

    dispatch(&state, MonitorCallback::LocationUpdates(locations), options).await
}

/// Report that monitoring of a region started.
#[utoipa::path(
    post,
    path = "/api/callbacks/started",
    tag = "callbacks",
    operation_id = "reportStartedMonitoring",
    summary = "Report monitoring started",
    description = "Acknowledges a region; its state is requested unless the platform is constrained.",
    request_body = StartedRequest,
    responses(
        (status = 200, description = "Handled", body = CallbackResponse),
        (status = 404, description = "Region is not monitored", body = ErrorResponse)
    )
)]
pub async fn started_monitoring(
    State(state): State<SharedState>,
    Json(request): Json<StartedRequest>,
) -> ApiResult<(StatusCode, Json<CallbackResponse>)> {
    let region = monitored_region(&state, &request.region)?;
    dispatch(
        &state,
        MonitorCallback::StartedMonitoring(region),
        CallbackOptions::default(),
    )
    .await
}

/// Report a monitoring error.
#[utoipa::path(
    post,
    path = "/api/callbacks/error",
    tag = "callbacks",
    operation_id = "reportMonitoringError",
    summary = "Report a monitoring error",
    description = "Logs an error from the monitoring service. Errors never produce events.",
    request_body = ErrorRequest,
    responses(
        (status = 200, description = "Logged", body = CallbackResponse),
        (status = 404, description = "Region is not monitored", body = ErrorResponse)
    )
)]
pub async fn monitoring_error(
    State(state): State<SharedState>,
    Json(request): Json<ErrorRequest>,
) -> ApiResult<(StatusCode, Json<CallbackResponse>)> {
    let callback = match request.region {
        Some(identifier) => MonitorCallback::MonitoringFailed {
            region: monitored_region(&state, &identifier)?,
            error: request.message,
        },
        None => MonitorCallback::Error(request.message),
    };
    dispatch(&state, callback, CallbackOptions::default()).await
}
