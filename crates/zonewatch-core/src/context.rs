//! State shared between this subsystem and the rest of the application.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::{Clock, SystemClock};

/// Platform variant the host runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Region monitoring behaves as documented.
    #[default]
    Standard,
    /// Region state requests are silently dropped and monitoring is unreliable,
    /// so state requests and staleness checks are skipped.
    Constrained,
}

/// Marks a foreground one-shot location query as in progress.
///
/// Clones share the same flag. While any [`OneShotQuery`] from [`begin`] is
/// alive, background event processing stands down so it does not compete
/// with the foreground fetch.
///
/// [`begin`]: OneShotGuard::begin
#[derive(Debug, Clone, Default)]
pub struct OneShotGuard {
    active: Arc<AtomicUsize>,
}

impl OneShotGuard {
    /// Create an inactive guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a one-shot query is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Mark a query as running until the returned handle is dropped.
    #[must_use = "the query is only marked active while the handle is alive"]
    pub fn begin(&self) -> OneShotQuery {
        self.active.fetch_add(1, Ordering::SeqCst);
        OneShotQuery {
            active: Arc::clone(&self.active),
        }
    }
}

/// Handle for a running one-shot query.
#[derive(Debug)]
pub struct OneShotQuery {
    active: Arc<AtomicUsize>,
}

impl Drop for OneShotQuery {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cross-subsystem coordination passed to the processor and coordinator.
#[derive(Clone)]
pub struct CoordinationContext {
    /// Foreground one-shot exclusivity flag.
    pub one_shot: OneShotGuard,
    /// Platform variant.
    pub platform: Platform,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl CoordinationContext {
    /// Context on `platform` with a fresh guard and the system clock.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            one_shot: OneShotGuard::new(),
            platform,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for CoordinationContext {
    fn default() -> Self {
        Self::new(Platform::default())
    }
}

impl std::fmt::Debug for CoordinationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationContext")
            .field("one_shot", &self.one_shot.is_active())
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_nested_queries() {
        let guard = OneShotGuard::new();
        let shared = guard.clone();
        assert!(!guard.is_active());

        let first = shared.begin();
        let second = guard.begin();
        assert!(guard.is_active());

        drop(first);
        assert!(shared.is_active());
        drop(second);
        assert!(!shared.is_active());
    }

    #[test]
    fn test_platform_parses_snake_case() {
        let platform: Platform = serde_json::from_str("\"constrained\"").unwrap();
        assert_eq!(platform, Platform::Constrained);
        assert_eq!(Platform::default(), Platform::Standard);
    }
}
