//! Scriptable collaborators for tests and for hosts running without a platform.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::event::TriggerKind;
use crate::geo::Location;
use crate::services::{ApiClient, Clock, Connectivity, LocatorError, OneShotLocator, SubmitError};
use crate::zone::Zone;

/// A location submission captured by [`RecordingApiClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Trigger kind.
    pub trigger: TriggerKind,
    /// Submitted location.
    pub location: Option<Location>,
    /// Associated zone.
    pub zone: Option<Zone>,
}

/// API client that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingApiClient {
    submissions: Mutex<Vec<Submission>>,
    events: Mutex<Vec<(String, serde_json::Value)>>,
    failure: Mutex<Option<SubmitError>>,
}

impl RecordingApiClient {
    /// A client that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later submission fail with `error`.
    pub fn fail_with(&self, error: SubmitError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error);
        }
    }

    /// Submissions so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Analytics events so far.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn failure(&self) -> Option<SubmitError> {
        self.failure.lock().ok().and_then(|failure| failure.clone())
    }
}

#[async_trait]
impl ApiClient for RecordingApiClient {
    async fn submit_location(
        &self,
        trigger: TriggerKind,
        location: Option<&Location>,
        zone: Option<&Zone>,
    ) -> Result<(), SubmitError> {
        if let Some(error) = self.failure() {
            return Err(error);
        }
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(Submission {
                trigger,
                location: location.cloned(),
                zone: zone.cloned(),
            });
        }
        Ok(())
    }

    async fn create_event(
        &self,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<(), SubmitError> {
        if let Ok(mut events) = self.events.lock() {
            events.push((event_type.to_string(), event_data));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Script {
    Return(Location),
    Fail(LocatorError),
    Hang,
}

/// One-shot locator with a fixed answer.
#[derive(Debug)]
pub struct ScriptedLocator {
    script: Script,
    last_known: Option<Location>,
    calls: AtomicUsize,
}

impl ScriptedLocator {
    /// Every fetch returns `location`.
    #[must_use]
    pub const fn returning(location: Location) -> Self {
        Self::with_script(Script::Return(location))
    }

    /// Every fetch fails with `error`.
    #[must_use]
    pub const fn failing(error: LocatorError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    /// Every fetch waits forever.
    #[must_use]
    pub const fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    const fn with_script(script: Script) -> Self {
        Self {
            script,
            last_known: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report `location` as the last known fix.
    #[must_use]
    pub fn with_last_known(mut self, location: Location) -> Self {
        self.last_known = Some(location);
        self
    }

    /// Number of one-shot fetches made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OneShotLocator for ScriptedLocator {
    async fn one_shot(&self, _timeout: Duration) -> Result<Location, LocatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Return(location) => Ok(location.clone()),
            Script::Fail(error) => Err(error.clone()),
            Script::Hang => std::future::pending().await,
        }
    }

    fn last_known(&self) -> Option<Location> {
        self.last_known.clone()
    }
}

/// Connectivity with a settable SSID.
#[derive(Debug, Default)]
pub struct FixedConnectivity {
    ssid: Mutex<Option<String>>,
}

impl FixedConnectivity {
    /// Connected to `ssid`, or to nothing.
    #[must_use]
    pub fn new(ssid: Option<&str>) -> Self {
        Self {
            ssid: Mutex::new(ssid.map(str::to_string)),
        }
    }

    /// Change the SSID.
    pub fn set(&self, ssid: Option<String>) {
        if let Ok(mut current) = self.ssid.lock() {
            *current = ssid;
        }
    }
}

impl Connectivity for FixedConnectivity {
    fn current_ssid(&self) -> Option<String> {
        self.ssid.lock().ok().and_then(|ssid| ssid.clone())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Stopped at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
