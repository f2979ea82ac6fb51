//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `callbacks` - Region-monitoring callbacks forwarded by the device
//! - `connectivity` - Current Wi-Fi network
//! - `events` - Diagnostic history
//! - `health` - Service health checks
//! - `regions` - Monitored regions and resync
//! - `settings` - Location source settings
//! - `zones` - Zone management
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

pub mod callbacks;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod health;
pub mod openapi;
pub mod regions;
pub mod settings;
pub mod zones;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                 - Health check
/// /api
/// ├── /zones              - Zone list, get, put, delete
/// ├── /regions            - Monitored regions, resync
/// ├── /callbacks          - Region state, locations, started, error
/// ├── /connectivity       - Current Wi-Fi network
/// ├── /settings           - Location sources
/// ├── /events             - Diagnostic history
/// └── /openapi.json       - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/zones", zones::router())
                .nest("/regions", regions::router())
                .nest("/callbacks", callbacks::router())
                .nest("/connectivity", connectivity::router())
                .nest("/settings", settings::router())
                .nest("/events", events::router()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tokio_test::assert_ok;
    use tower::ServiceExt;
    use zonewatch_core::testing::RecordingApiClient;
    use zonewatch_core::{Coordinate, RegionMonitor, Zone, ZonewatchConfig};

    use super::*;
    use crate::state::AppState;

    fn home() -> Zone {
        Zone::new("zone.home", Coordinate::new(37.1234, -122.4567), 50.0)
    }

    fn work() -> Zone {
        Zone::new("zone.work", Coordinate::new(37.2345, -122.5678), 100.0)
    }

    async fn app(zones: Vec<Zone>) -> (AppState, Arc<RecordingApiClient>) {
        let api = Arc::new(RecordingApiClient::new());
        let state = AppState::with_api(ZonewatchConfig::default(), zones, api.clone());
        assert_ok!(state.coordinator().initialize().await);
        (state, api)
    }

    async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |body| Body::from(body.to_string())))
            .unwrap();

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_for_regions(state: &AppState, count: usize) {
        for _ in 0..100 {
            if state.monitor().monitored_regions().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} monitored regions");
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = app(vec![home(), work()]).await;
        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["zones"], 2);
        assert_eq!(body["monitored_regions"], 4);
        assert_eq!(body["webhook_configured"], false);
    }

    #[tokio::test]
    async fn test_regions_listed_sorted() {
        let (state, _) = app(vec![home(), work()]).await;
        let (status, body) = send(&state, Method::GET, "/api/regions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["circular_count"], 4);
        assert_eq!(body["beacon_count"], 0);

        let identifiers: Vec<&str> = body["regions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|region| region["identifier"].as_str().unwrap())
            .collect();
        assert_eq!(
            identifiers,
            vec!["zone.home@000", "zone.home@120", "zone.home@240", "zone.work"]
        );
    }

    #[tokio::test]
    async fn test_put_zone_creates_and_resyncs() {
        let (state, _) = app(vec![]).await;

        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/zones/zone.work",
            Some(json!({"latitude": 37.2345, "longitude": -122.5678, "radius": 150.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "zone.work");

        wait_for_regions(&state, 1).await;

        let (status, _) = send(
            &state,
            Method::PUT,
            "/api/zones/zone.work",
            Some(json!({"latitude": 37.2345, "longitude": -122.5678, "radius": 200.0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_zone_rejects_bad_id() {
        let (state, _) = app(vec![]).await;
        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/zones/home",
            Some(json!({"latitude": 1.0, "longitude": 2.0, "radius": 150.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_zone_id");
    }

    #[tokio::test]
    async fn test_delete_zone() {
        let (state, _) = app(vec![home(), work()]).await;

        let (status, _) = send(&state, Method::DELETE, "/api/zones/zone.home", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        wait_for_regions(&state, 1).await;

        let (status, body) = send(&state, Method::DELETE, "/api/zones/zone.home", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "zone_not_found");
    }

    #[tokio::test]
    async fn test_region_state_callback_submits() {
        let (state, api) = app(vec![work()]).await;
        let enter = json!({"region": "zone.work", "state": "inside"});

        // the first state after monitoring starts is swallowed
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/callbacks/region-state?wait=true",
            Some(enter.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event_created"], false);

        send(
            &state,
            Method::POST,
            "/api/callbacks/locations?wait=true",
            Some(json!({"locations": [
                {"latitude": 37.2345, "longitude": -122.5678, "horizontal_accuracy": 10.0}
            ]})),
        )
        .await;
        let before = api.submissions().len();

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/callbacks/region-state?wait=true",
            Some(enter),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], true);

        let submissions = api.submissions();
        assert_eq!(submissions.len(), before + 1);
        assert_eq!(
            submissions.last().and_then(|s| s.zone.as_ref()).map(|z| z.id.as_str()),
            Some("zone.work")
        );
    }

    #[tokio::test]
    async fn test_unknown_region_callback_is_not_found() {
        let (state, _) = app(vec![work()]).await;
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/callbacks/region-state",
            Some(json!({"region": "zone.nowhere", "state": "inside"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "region_not_monitored");
    }

    #[tokio::test]
    async fn test_ssid_filter_suppresses_event() {
        let mut filtered = work();
        filtered.ssid_filter = vec!["office-wifi".into()];
        let (state, api) = app(vec![filtered]).await;

        let (_, body) = send(
            &state,
            Method::PUT,
            "/api/connectivity",
            Some(json!({"ssid": "office-wifi"})),
        )
        .await;
        assert_eq!(body["ssid"], "office-wifi");

        let exit = json!({"region": "zone.work", "state": "outside"});
        send(&state, Method::POST, "/api/callbacks/region-state?wait=true", Some(exit.clone())).await;
        send(&state, Method::POST, "/api/callbacks/region-state?wait=true", Some(exit)).await;

        assert!(api.submissions().is_empty());
        let (_, events) = send(&state, Method::GET, "/api/events?kind=location_update", None).await;
        let texts: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|event| event["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Didn't update"));
    }

    #[tokio::test]
    async fn test_disabling_zone_source_clears_regions() {
        let (state, _) = app(vec![home(), work()]).await;
        let (status, body) = send(
            &state,
            Method::PUT,
            "/api/settings/location-sources",
            Some(json!({"zone": false, "significant_location_change": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sync"]["removed"].as_array().unwrap().len(), 4);
        assert!(state.monitor().monitored_regions().is_empty());

        let (_, body) = send(&state, Method::GET, "/api/settings/location-sources", None).await;
        assert_eq!(body["zone"], false);
    }

    #[tokio::test]
    async fn test_events_limit_and_clear() {
        let (state, _) = app(vec![home(), work()]).await;

        let (_, events) = send(&state, Method::GET, "/api/events?limit=2", None).await;
        assert_eq!(events.as_array().unwrap().len(), 2);

        let (status, _) = send(&state, Method::DELETE, "/api/events", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, events) = send(&state, Method::GET, "/api/events", None).await;
        assert!(events.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_openapi_served() {
        let (state, _) = app(vec![]).await;
        let (status, body) = send(&state, Method::GET, "/api/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "zonewatch API");
    }
}
