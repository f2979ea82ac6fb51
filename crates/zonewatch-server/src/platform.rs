//! Platform collaborators backed by what clients report over HTTP.
//!
//! The server has no radio of its own: the device reports its network and
//! location fixes, and these types hand them to the core.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use zonewatch_core::{Connectivity, Location, LocatorError, OneShotLocator};

/// Connectivity that reports the SSID the device last told us about.
#[derive(Debug, Default)]
pub struct ReportedConnectivity {
    ssid: RwLock<Option<String>>,
}

impl ReportedConnectivity {
    /// Record the device's current network, `None` when disconnected.
    pub fn report(&self, ssid: Option<String>) {
        if let Ok(mut current) = self.ssid.write() {
            tracing::debug!(ssid = ?ssid, "connectivity reported");
            *current = ssid.filter(|s| !s.is_empty());
        }
    }
}

impl Connectivity for ReportedConnectivity {
    fn current_ssid(&self) -> Option<String> {
        self.ssid.read().ok().and_then(|ssid| ssid.clone())
    }
}

/// Locator answering with the newest fix the device has reported.
#[derive(Debug, Default)]
pub struct LastKnownLocator {
    latest: RwLock<Option<Location>>,
}

impl LastKnownLocator {
    /// Record a reported fix if it is newer than the one held.
    pub fn report(&self, location: &Location) {
        if let Ok(mut latest) = self.latest.write() {
            let newer = latest
                .as_ref()
                .map_or(true, |current| location.timestamp >= current.timestamp);
            if newer {
                *latest = Some(location.clone());
            }
        }
    }
}

#[async_trait]
impl OneShotLocator for LastKnownLocator {
    async fn one_shot(&self, _timeout: Duration) -> Result<Location, LocatorError> {
        self.last_known()
            .ok_or_else(|| LocatorError::Unavailable("device has not reported a location".into()))
    }

    fn last_known(&self) -> Option<Location> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use zonewatch_core::Coordinate;

    #[test]
    fn test_empty_ssid_means_disconnected() {
        let connectivity = ReportedConnectivity::default();
        connectivity.report(Some("home-wifi".into()));
        assert_eq!(connectivity.current_ssid().as_deref(), Some("home-wifi"));

        connectivity.report(Some(String::new()));
        assert!(connectivity.current_ssid().is_none());
    }

    #[tokio::test]
    async fn test_locator_keeps_newest_fix() {
        let locator = LastKnownLocator::default();
        assert_eq!(
            locator.one_shot(Duration::from_secs(1)).await,
            Err(LocatorError::Unavailable("device has not reported a location".into()))
        );

        let now = Utc::now();
        let newer = Location::new(Coordinate::new(1.0, 1.0), 5.0, now);
        let older = Location::new(Coordinate::new(2.0, 2.0), 5.0, now - ChronoDuration::seconds(60));

        locator.report(&newer);
        locator.report(&older);
        assert_eq!(locator.one_shot(Duration::from_secs(1)).await, Ok(newer));
    }
}
