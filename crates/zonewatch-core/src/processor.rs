//! Deciding whether an event is actionable, and submitting a location for it.
//!
//! [`EventProcessor::perform`] first evaluates the event against a fixed,
//! ordered list of rules; the first rule that matches ignores the event with
//! an [`IgnoreReason`]. Region events that pass the zone checks write the
//! zone's `in_region` flag before the beacon-exit rule runs, so a beacon exit
//! still updates membership without submitting anything.
//!
//! Accepted events then fetch a location inside a background window: a fresh
//! one-shot fix bounded by the remaining window, falling back to whatever fix
//! is already known. The fix goes through the [`FuzzerChain`] and is submitted.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProcessingConfig;
use crate::context::{CoordinationContext, Platform};
use crate::error::{IgnoreReason, ProcessError, ZonewatchError};
use crate::event::{Event, EventKind, ManagerState, TriggerKind};
use crate::fuzzer::{FuzzContext, FuzzerChain};
use crate::geo::Location;
use crate::region::RegionState;
use crate::services::{
    run_in_background, ApiClient, BackgroundExecution, Connectivity, OneShotLocator, RegionMonitor,
    ZoneStore,
};
use crate::zone::RegionGeometry;

/// Name of the background window a submission runs in.
pub const SUBMIT_TASK_NAME: &str = "zone-manager-submit-location";

/// Processing thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSettings {
    /// Location batches older than this are ignored.
    pub stale_after: Duration,
    /// Upper bound on a one-shot fetch.
    pub one_shot_timeout: Duration,
    /// Zone expansion, used by the fuzzers.
    pub geometry: RegionGeometry,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default(), RegionGeometry::default())
    }
}

impl ProcessorSettings {
    /// Settings from the processing configuration.
    #[must_use]
    pub const fn from_config(config: &ProcessingConfig, geometry: RegionGeometry) -> Self {
        Self {
            stale_after: config.stale_after(),
            one_shot_timeout: config.one_shot_timeout(),
            geometry,
        }
    }
}

/// Collaborators the processor depends on.
#[derive(Clone)]
pub struct ProcessorServices {
    /// Zone lookup and `in_region` writes.
    pub zones: Arc<dyn ZoneStore>,
    /// Location submission.
    pub api: Arc<dyn ApiClient>,
    /// Fresh fixes.
    pub locator: Arc<dyn OneShotLocator>,
    /// Current SSID.
    pub connectivity: Arc<dyn Connectivity>,
    /// Fallback last known location.
    pub monitor: Arc<dyn RegionMonitor>,
    /// Background windows.
    pub background: Arc<dyn BackgroundExecution>,
}

/// Evaluates events and submits locations for the actionable ones.
pub struct EventProcessor {
    services: ProcessorServices,
    context: CoordinationContext,
    fuzzers: FuzzerChain,
    settings: ProcessorSettings,
}

impl EventProcessor {
    /// Processor with the default fuzzer chain.
    #[must_use]
    pub fn new(
        services: ProcessorServices,
        context: CoordinationContext,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            services,
            context,
            fuzzers: FuzzerChain::default(),
            settings,
        }
    }

    /// Evaluate `event` and, if actionable, submit a location for it.
    ///
    /// # Errors
    ///
    /// [`ProcessError::Ignored`] when the event carries no actionable work,
    /// [`ProcessError::Failed`] when fetching or submitting failed.
    pub async fn perform(&self, event: &Event) -> Result<(), ProcessError> {
        if let Err(reason) = self.evaluate(event) {
            ManagerState::DidIgnore(event, &reason).log();
            return Err(reason.into());
        }
        ManagerState::DidReceive(event).log();

        let trigger = event.trigger();
        run_in_background(
            self.services.background.as_ref(),
            SUBMIT_TASK_NAME,
            |remaining| async move { self.submit(event, trigger, remaining).await },
        )
        .await
        .map_err(ProcessError::Failed)
    }

    fn evaluate(&self, event: &Event) -> Result<(), IgnoreReason> {
        if self.context.one_shot.is_active() {
            return Err(IgnoreReason::DuringOneShot);
        }

        match &event.kind {
            EventKind::LocationBatch(locations) => self.evaluate_locations(locations),
            EventKind::RegionStateChange { region, state } => {
                if *state == RegionState::Unknown {
                    return Err(IgnoreReason::UnknownRegionState);
                }
                let zone = event
                    .associated_zone
                    .as_ref()
                    .ok_or(IgnoreReason::UnknownRegion)?;
                if !zone.tracking_enabled {
                    return Err(IgnoreReason::ZoneDisabled);
                }
                if let Some(ssid) = self.services.connectivity.current_ssid() {
                    if zone.ssid_filter.contains(&ssid) {
                        return Err(IgnoreReason::IgnoredSsid(ssid));
                    }
                }

                self.services
                    .zones
                    .set_in_region(&zone.id, *state == RegionState::Inside)
                    .map_err(IgnoreReason::ZoneUpdateFailed)?;

                if region.is_beacon() && *state == RegionState::Outside {
                    return Err(IgnoreReason::BeaconExitIgnored);
                }
                Ok(())
            }
        }
    }

    fn evaluate_locations(&self, locations: &[Location]) -> Result<(), IgnoreReason> {
        let Some(last) = locations.last() else {
            return Err(IgnoreReason::LocationMissingEntries);
        };

        // monitoring is unreliable on the constrained platform, so late fixes still count there
        if self.context.platform != Platform::Constrained {
            let age = last.age(self.context.clock.now());
            if age.to_std().is_ok_and(|age| age > self.settings.stale_after) {
                return Err(IgnoreReason::LocationUpdateTooOld);
            }
        }
        Ok(())
    }

    async fn submit(
        &self,
        event: &Event,
        trigger: TriggerKind,
        remaining: Option<Duration>,
    ) -> Result<(), ZonewatchError> {
        let location = if event.needs_fresh_location() {
            let fresh = self.fresh_location(event, trigger, remaining).await?;
            Some(fresh)
        } else {
            event.associated_location(self.context.clock.now())
        };

        let location = location.map(|location| self.sanitize(&location, event));

        self.services
            .api
            .submit_location(trigger, location.as_ref(), event.associated_zone.as_ref())
            .await?;

        tracing::info!(%trigger, location = ?location.as_ref().map(ToString::to_string), "submitted location");
        Ok(())
    }

    async fn fresh_location(
        &self,
        event: &Event,
        trigger: TriggerKind,
        remaining: Option<Duration>,
    ) -> Result<Location, ZonewatchError> {
        let timeout = trigger.one_shot_timeout(self.settings.one_shot_timeout, remaining);
        // events arriving while this fetch runs are side effects of it
        let _query = self.context.one_shot.begin();

        let error = match tokio::time::timeout(timeout, self.services.locator.one_shot(timeout)).await {
            Ok(Ok(location)) => return Ok(location),
            Ok(Err(error)) => ZonewatchError::from(error),
            Err(_) => ZonewatchError::LocationUnavailable(format!(
                "no fix within {}ms",
                timeout.as_millis()
            )),
        };

        tracing::warn!(%error, "one-shot location failed, falling back to last known");
        self.services
            .locator
            .last_known()
            .or_else(|| self.services.monitor.last_location())
            .or_else(|| event.associated_location(self.context.clock.now()))
            .ok_or(error)
    }

    fn sanitize(&self, location: &Location, event: &Event) -> Location {
        let zones = self.services.zones.zones();
        let context = FuzzContext {
            zones: &zones,
            geometry: &self.settings.geometry,
        };
        self.fuzzers.sanitize(location, event, &context)
    }
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("context", &self.context)
            .field("fuzzers", &self.fuzzers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_test::assert_ok;

    use crate::geo::Coordinate;
    use crate::monitor::MemoryRegionMonitor;
    use crate::region::{BeaconIdentity, BeaconRegion, CircularRegion, Region};
    use crate::services::{LocatorError, SubmitError, TimedBackground};
    use crate::store::{MemoryZoneStore, ZoneStoreError};
    use crate::testing::{FixedClock, FixedConnectivity, RecordingApiClient, ScriptedLocator};
    use crate::zone::Zone;

    const HOME: Coordinate = Coordinate::new(37.1234, -122.4567);

    struct Harness {
        processor: EventProcessor,
        store: Arc<MemoryZoneStore>,
        api: Arc<RecordingApiClient>,
        locator: Arc<ScriptedLocator>,
        monitor: Arc<MemoryRegionMonitor>,
        connectivity: Arc<FixedConnectivity>,
        clock: Arc<FixedClock>,
        context: CoordinationContext,
    }

    fn home() -> Zone {
        let mut zone = Zone::new("zone.home", HOME, 100.0);
        zone.ssid_filter = vec!["HomeWiFi".into()];
        zone
    }

    fn fix(distance: f64, accuracy: f64) -> Location {
        Location::new(HOME.moving(distance, 1.0), accuracy, Utc::now())
    }

    fn harness_with(zones: Vec<Zone>, locator: ScriptedLocator, platform: Platform) -> Harness {
        let store = Arc::new(MemoryZoneStore::with_zones(zones));
        let api = Arc::new(RecordingApiClient::new());
        let locator = Arc::new(locator);
        let connectivity = Arc::new(FixedConnectivity::new(None));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let context = CoordinationContext::new(platform).with_clock(clock.clone());
        let monitor = Arc::new(MemoryRegionMonitor::new());

        let services = ProcessorServices {
            zones: store.clone(),
            api: api.clone(),
            locator: locator.clone(),
            connectivity: connectivity.clone(),
            monitor: monitor.clone(),
            background: Arc::new(TimedBackground::new(Duration::from_secs(25))),
        };

        Harness {
            processor: EventProcessor::new(services, context.clone(), ProcessorSettings::default()),
            store,
            api,
            locator,
            monitor,
            connectivity,
            clock,
            context,
        }
    }

    fn harness() -> Harness {
        harness_with(vec![home()], ScriptedLocator::returning(fix(10.0, 5.0)), Platform::Standard)
    }

    fn circle_event(state: RegionState) -> Event {
        Event::region(home().circular_region().into(), state, Some(home()))
    }

    fn beacon_event(state: RegionState) -> Event {
        let region: Region = BeaconRegion {
            identifier: "zone.home".into(),
            beacon: BeaconIdentity {
                uuid: uuid::Uuid::nil(),
                major: None,
                minor: None,
            },
        }
        .into();
        Event::region(region, state, Some(home()))
    }

    fn ignored(result: Result<(), ProcessError>) -> IgnoreReason {
        match result {
            Err(ProcessError::Ignored(reason)) => reason,
            other => panic!("expected ignore, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ignored_during_one_shot() {
        let h = harness();
        let _query = h.context.one_shot.begin();
        let reason = ignored(h.processor.perform(&circle_event(RegionState::Inside)).await);
        assert_eq!(reason, IgnoreReason::DuringOneShot);
        assert!(h.api.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_ignored() {
        let h = harness();
        let reason = ignored(h.processor.perform(&Event::locations(vec![])).await);
        assert_eq!(reason, IgnoreReason::LocationMissingEntries);
    }

    #[tokio::test]
    async fn test_stale_batch_ignored_except_on_constrained() {
        let h = harness();
        let location = fix(0.0, 5.0);
        h.clock.advance(chrono::Duration::seconds(31));
        let event = Event::locations(vec![location.clone()]);
        assert_eq!(
            ignored(h.processor.perform(&event).await),
            IgnoreReason::LocationUpdateTooOld
        );

        let constrained = harness_with(
            vec![home()],
            ScriptedLocator::returning(location.clone()),
            Platform::Constrained,
        );
        constrained.clock.advance(chrono::Duration::seconds(300));
        constrained.processor.perform(&event).await.unwrap();
        assert_eq!(constrained.api.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_submits_significant_update() {
        let h = harness();
        let event = Event::locations(vec![fix(500.0, 5.0), fix(10.0, 5.0)]);
        assert_ok!(h.processor.perform(&event).await);

        let submissions = h.api.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].trigger, TriggerKind::SignificantLocationUpdate);
        assert!(submissions[0].zone.is_none());
    }

    #[tokio::test]
    async fn test_unknown_state_ignored() {
        let h = harness();
        let reason = ignored(h.processor.perform(&circle_event(RegionState::Unknown)).await);
        assert_eq!(reason, IgnoreReason::UnknownRegionState);
    }

    #[tokio::test]
    async fn test_unknown_region_ignored() {
        let h = harness();
        let region: Region = CircularRegion::new("zone.gone", HOME, 100.0).into();
        let event = Event::region(region, RegionState::Inside, None);
        assert_eq!(ignored(h.processor.perform(&event).await), IgnoreReason::UnknownRegion);
    }

    #[tokio::test]
    async fn test_disabled_zone_leaves_in_region_unwritten() {
        let mut disabled = home();
        disabled.tracking_enabled = false;
        let h = harness_with(
            vec![disabled.clone()],
            ScriptedLocator::returning(fix(0.0, 5.0)),
            Platform::Standard,
        );

        let event = Event::region(disabled.circular_region().into(), RegionState::Inside, Some(disabled));
        assert_eq!(ignored(h.processor.perform(&event).await), IgnoreReason::ZoneDisabled);
        assert!(!h.store.zone("zone.home").unwrap().in_region);
    }

    #[tokio::test]
    async fn test_ignored_ssid_for_enter_and_exit() {
        let h = harness();
        h.connectivity.set(Some("HomeWiFi".into()));

        for state in [RegionState::Inside, RegionState::Outside] {
            let reason = ignored(h.processor.perform(&circle_event(state)).await);
            assert_eq!(reason, IgnoreReason::IgnoredSsid("HomeWiFi".into()));
        }
        assert!(h.api.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_zone_update_failure_ignored() {
        let h = harness_with(vec![], ScriptedLocator::returning(fix(0.0, 5.0)), Platform::Standard);
        let reason = ignored(h.processor.perform(&circle_event(RegionState::Inside)).await);
        assert_eq!(
            reason,
            IgnoreReason::ZoneUpdateFailed(ZoneStoreError::NotFound("zone.home".into()))
        );
    }

    #[tokio::test]
    async fn test_beacon_exit_writes_then_ignores() {
        let mut inside = home();
        inside.in_region = true;
        let h = harness_with(vec![inside], ScriptedLocator::returning(fix(0.0, 5.0)), Platform::Standard);

        let reason = ignored(h.processor.perform(&beacon_event(RegionState::Outside)).await);
        assert_eq!(reason, IgnoreReason::BeaconExitIgnored);
        assert!(!h.store.zone("zone.home").unwrap().in_region);
        assert!(h.api.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_beacon_enter_uses_zone_location() {
        let h = harness();
        assert_ok!(h.processor.perform(&beacon_event(RegionState::Inside)).await);

        assert_eq!(h.locator.calls(), 0);
        let submissions = h.api.submissions();
        assert_eq!(submissions[0].trigger, TriggerKind::BeaconRegionEnter);
        assert_eq!(submissions[0].location.as_ref().unwrap().coordinate, HOME);
        assert!(h.store.zone("zone.home").unwrap().in_region);
    }

    #[tokio::test]
    async fn test_region_enter_submits_fuzzed_location() {
        // fix 180m out with 10m accuracy does not reach the 100m zone
        let h = harness_with(
            vec![home()],
            ScriptedLocator::returning(fix(180.0, 10.0)),
            Platform::Standard,
        );
        assert_ok!(h.processor.perform(&circle_event(RegionState::Inside)).await);

        let submission = &h.api.submissions()[0];
        assert_eq!(submission.trigger, TriggerKind::GpsRegionEnter);
        assert_eq!(submission.zone.as_ref().map(|z| z.id.as_str()), Some("zone.home"));
        let location = submission.location.as_ref().unwrap();
        assert!(home().circular_region().contains_with_accuracy(location));
        assert!(h.store.zone("zone.home").unwrap().in_region);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_timeout_falls_back_to_last_known() {
        let last_known = fix(20.0, 30.0);
        let h = harness_with(
            vec![home()],
            ScriptedLocator::hanging().with_last_known(last_known.clone()),
            Platform::Standard,
        );
        assert_ok!(h.processor.perform(&circle_event(RegionState::Outside)).await);

        let submission = &h.api.submissions()[0];
        assert_eq!(submission.trigger, TriggerKind::GpsRegionExit);
        assert_eq!(submission.location.as_ref(), Some(&last_known));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_prefers_locator_then_monitor() {
        let cached = fix(20.0, 30.0);
        let monitored = fix(60.0, 40.0);

        let h = harness_with(vec![home()], ScriptedLocator::hanging(), Platform::Standard);
        h.monitor.set_last_location(Some(monitored.clone()));
        assert_ok!(h.processor.perform(&circle_event(RegionState::Outside)).await);
        assert_eq!(h.api.submissions()[0].location.as_ref(), Some(&monitored));

        let h = harness_with(
            vec![home()],
            ScriptedLocator::hanging().with_last_known(cached.clone()),
            Platform::Standard,
        );
        h.monitor.set_last_location(Some(monitored));
        assert_ok!(h.processor.perform(&circle_event(RegionState::Outside)).await);
        assert_eq!(h.api.submissions()[0].location.as_ref(), Some(&cached));
    }

    #[tokio::test]
    async fn test_no_location_at_all_fails() {
        let h = harness_with(
            vec![home()],
            ScriptedLocator::failing(LocatorError::Unavailable("denied".into())),
            Platform::Standard,
        );
        let result = h.processor.perform(&circle_event(RegionState::Inside)).await;
        assert!(matches!(
            result,
            Err(ProcessError::Failed(ZonewatchError::LocationUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_submission_failure_is_hard_error() {
        let h = harness();
        h.api.fail_with(SubmitError::Rejected { status: 500 });
        let result = h.processor.perform(&circle_event(RegionState::Inside)).await;
        match result {
            Err(ProcessError::Failed(error)) => assert_eq!(error.error_code(), "SUBMISSION_FAILED"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
