//! Diagnostic history API endpoints.
//!
//! The history records what the geofencing subsystem did and why: regions
//! started and ended, limits exceeded, updates sent or skipped.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use zonewatch_core::{ClientEvent, ClientEventKind};

use crate::state::SharedState;

/// Creates the events router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_events).delete(clear_events))
}

/// Category of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKindBody {
    /// Location update submitted or skipped.
    LocationUpdate,
    /// Region monitoring started, ended or limited.
    RegionMonitoring,
    /// Location settings changed.
    Settings,
}

impl From<ClientEventKind> for EventKindBody {
    fn from(kind: ClientEventKind) -> Self {
        match kind {
            ClientEventKind::LocationUpdate => Self::LocationUpdate,
            ClientEventKind::RegionMonitoring => Self::RegionMonitoring,
            ClientEventKind::Settings => Self::Settings,
        }
    }
}

impl From<EventKindBody> for ClientEventKind {
    fn from(kind: EventKindBody) -> Self {
        match kind {
            EventKindBody::LocationUpdate => Self::LocationUpdate,
            EventKindBody::RegionMonitoring => Self::RegionMonitoring,
            EventKindBody::Settings => Self::Settings,
        }
    }
}

/// A diagnostic entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "0190c6d2-5d7e-7c9a-8f1e-2b3c4d5e6f70",
    "date": "2024-05-01T08:30:00Z",
    "text": "Initially monitoring zone.home@120",
    "kind": "region_monitoring",
    "payload": {"region": "zone.home@120 (37.1229, -122.4563) r100m"}
}))]
pub struct EventBody {
    /// Time-ordered identifier.
    pub id: Uuid,

    /// When the entry was recorded.
    pub date: DateTime<Utc>,

    /// Summary.
    pub text: String,

    /// Category.
    pub kind: EventKindBody,

    /// Structured details.
    #[schema(value_type = Object)]
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl From<ClientEvent> for EventBody {
    fn from(event: ClientEvent) -> Self {
        Self {
            id: event.id,
            date: event.date,
            text: event.text,
            kind: event.kind.into(),
            payload: event.payload,
        }
    }
}

/// Filters for listing entries.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Only entries of this kind.
    pub kind: Option<EventKindBody>,

    /// At most this many of the newest entries.
    pub limit: Option<usize>,
}

/// List diagnostic entries.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    operation_id = "listEvents",
    summary = "List diagnostic entries",
    description = "Returns the diagnostic history, oldest first.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Entries retrieved", body = [EventBody])
    )
)]
pub async fn list_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<EventBody>> {
    let events = match query.kind {
        Some(kind) => state.diagnostics().events_of_kind(kind.into()),
        None => state.diagnostics().events(),
    };

    let skip = query
        .limit
        .map_or(0, |limit| events.len().saturating_sub(limit));

    Json(events.into_iter().skip(skip).map(EventBody::from).collect())
}

/// Clear diagnostic entries.
#[utoipa::path(
    delete,
    path = "/api/events",
    tag = "events",
    operation_id = "clearEvents",
    summary = "Clear diagnostic entries",
    responses(
        (status = 204, description = "History cleared")
    )
)]
pub async fn clear_events(State(state): State<SharedState>) -> StatusCode {
    state.diagnostics().clear();
    StatusCode::NO_CONTENT
}
