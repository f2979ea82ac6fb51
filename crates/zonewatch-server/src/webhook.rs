//! Home Assistant style webhook client.
//!
//! Location updates are posted as `update_location` requests and zone
//! analytics as `fire_event` requests to a single webhook URL.

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use zonewatch_core::{ApiClient, Location, SubmitError, TriggerKind, Zone};

/// Location name reported for the home zone.
const HOME_LOCATION_NAME: &str = "home";

/// Body of every webhook request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookRequest<T> {
    /// Request type, e.g. `update_location`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Request data.
    pub data: T,
}

/// Data of an `update_location` request. Absent values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateLocation {
    /// `[latitude, longitude]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<[f64; 2]>,
    /// Horizontal accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_accuracy: Option<f64>,
    /// Speed in meters per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Altitude in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Course in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Vertical accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_accuracy: Option<f64>,
    /// Zone the device is known to be in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

impl UpdateLocation {
    /// Build the update for a trigger.
    ///
    /// Beacon enters report the zone itself rather than the fix, since being
    /// next to the beacon is more precise than any GPS reading. Beacon exits
    /// carry no location at all.
    #[must_use]
    pub fn new(trigger: TriggerKind, location: Option<&Location>, zone: Option<&Zone>) -> Self {
        match (trigger, zone) {
            (TriggerKind::BeaconRegionExit, _) => Self::default(),
            (TriggerKind::BeaconRegionEnter, Some(zone)) => Self {
                gps: Some([zone.center.latitude, zone.center.longitude]),
                gps_accuracy: Some(zone.radius),
                location_name: location_name(zone),
                ..Self::default()
            },
            _ => location.map(Self::from_location).unwrap_or_default(),
        }
    }

    fn from_location(location: &Location) -> Self {
        Self {
            gps: Some([location.coordinate.latitude, location.coordinate.longitude]),
            gps_accuracy: Some(location.horizontal_accuracy),
            speed: location.speed,
            altitude: location.altitude,
            course: location.course,
            vertical_accuracy: location.vertical_accuracy,
            location_name: None,
        }
    }
}

fn location_name(zone: &Zone) -> Option<String> {
    if zone.is_passive {
        None
    } else if zone.is_home() {
        Some(HOME_LOCATION_NAME.to_string())
    } else {
        Some(zone.display_name())
    }
}

/// Data of a `fire_event` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireEvent {
    /// Event type.
    pub event_type: String,
    /// Event data.
    pub event_data: serde_json::Value,
}

/// [`ApiClient`] posting to a webhook. Without a URL every call fails with
/// [`SubmitError::NotConfigured`].
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: Option<Url>,
}

impl WebhookClient {
    /// Client for `url`, which is parsed here.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid URL.
    pub fn new(url: Option<&str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: url.map(Url::parse).transpose()?,
        })
    }

    /// Whether a webhook URL is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    async fn post<T: Serialize + Sync>(&self, request: &WebhookRequest<T>) -> Result<(), SubmitError> {
        let url = self.url.as_ref().ok_or(SubmitError::NotConfigured)?;

        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(kind = request.kind, %status, "webhook rejected request");
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(kind = request.kind, %status, "webhook accepted request");
        Ok(())
    }
}

#[async_trait]
impl ApiClient for WebhookClient {
    async fn submit_location(
        &self,
        trigger: TriggerKind,
        location: Option<&Location>,
        zone: Option<&Zone>,
    ) -> Result<(), SubmitError> {
        self.post(&WebhookRequest {
            kind: "update_location",
            data: UpdateLocation::new(trigger, location, zone),
        })
        .await
    }

    async fn create_event(
        &self,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<(), SubmitError> {
        self.post(&WebhookRequest {
            kind: "fire_event",
            data: FireEvent {
                event_type: event_type.to_string(),
                event_data,
            },
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use zonewatch_core::Coordinate;

    fn fix() -> Location {
        Location {
            altitude: Some(103.0),
            vertical_accuracy: Some(105.0),
            speed: Some(108.0),
            course: Some(106.0),
            ..Location::new(Coordinate::new(1.23, 4.56), 104.0, Utc::now())
        }
    }

    fn zone(id: &str) -> Zone {
        Zone::new(id, Coordinate::new(-2.34, -5.67), 88.8)
    }

    #[test]
    fn test_gps_enter_reports_fix() {
        let update = UpdateLocation::new(
            TriggerKind::GpsRegionEnter,
            Some(&fix()),
            Some(&zone("zone.given_name")),
        );
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            json!({
                "gps": [1.23, 4.56],
                "gps_accuracy": 104.0,
                "speed": 108.0,
                "altitude": 103.0,
                "course": 106.0,
                "vertical_accuracy": 105.0,
            })
        );
    }

    #[test]
    fn test_beacon_enter_reports_zone() {
        let update = UpdateLocation::new(
            TriggerKind::BeaconRegionEnter,
            Some(&fix()),
            Some(&zone("zone.given_name")),
        );
        assert_eq!(update.gps, Some([-2.34, -5.67]));
        assert_eq!(update.gps_accuracy, Some(88.8));
        assert_eq!(update.location_name.as_deref(), Some("Given Name"));
        assert!(update.speed.is_none());
    }

    #[test]
    fn test_beacon_enter_home_is_named_home() {
        let update = UpdateLocation::new(
            TriggerKind::BeaconRegionEnter,
            Some(&fix()),
            Some(&zone("zone.home")),
        );
        assert_eq!(update.location_name.as_deref(), Some("home"));
    }

    #[test]
    fn test_passive_beacon_enter_has_no_name() {
        let mut passive = zone("zone.given_name");
        passive.is_passive = true;
        let update = UpdateLocation::new(TriggerKind::BeaconRegionEnter, Some(&fix()), Some(&passive));
        assert_eq!(update.gps, Some([-2.34, -5.67]));
        assert!(update.location_name.is_none());
    }

    #[test]
    fn test_beacon_exit_has_no_location() {
        let update = UpdateLocation::new(
            TriggerKind::BeaconRegionExit,
            Some(&fix()),
            Some(&zone("zone.given_name")),
        );
        assert_eq!(update, UpdateLocation::default());
        assert_eq!(serde_json::to_value(update).unwrap(), json!({}));
    }

    #[test]
    fn test_missing_location_and_zone() {
        let update = UpdateLocation::new(TriggerKind::GpsRegionExit, None, None);
        assert_eq!(update, UpdateLocation::default());
    }

    #[test]
    fn test_request_envelope() {
        let request = WebhookRequest {
            kind: "update_location",
            data: UpdateLocation::default(),
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"type": "update_location", "data": {}})
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client = WebhookClient::new(None).unwrap();
        assert!(!client.is_configured());
        let result = client
            .submit_location(TriggerKind::GpsRegionEnter, Some(&fix()), None)
            .await;
        assert_eq!(result, Err(SubmitError::NotConfigured));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(WebhookClient::new(Some("not a url")).is_err());
    }
}
