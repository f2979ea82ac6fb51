//! User-visible diagnostic history.
//!
//! Separate from `tracing` output: these entries describe what the geofencing
//! subsystem did (regions started and ended, limits exceeded, updates sent or
//! skipped) and are kept so they can be shown back to the user.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of entries kept by [`MemoryClientEventStore`].
pub const DEFAULT_CAPACITY: usize = 500;

/// Category of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventKind {
    /// Location update submitted or skipped.
    LocationUpdate,
    /// Region monitoring started, ended or limited.
    RegionMonitoring,
    /// Location settings changed.
    Settings,
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Unique, time-ordered identifier.
    pub id: Uuid,
    /// When the entry was recorded.
    pub date: DateTime<Utc>,
    /// Free text summary.
    pub text: String,
    /// Category.
    pub kind: ClientEventKind,
    /// Structured details.
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl ClientEvent {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(text: impl Into<String>, kind: ClientEventKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            date: Utc::now(),
            text: text.into(),
            kind,
            payload: BTreeMap::new(),
        }
    }

    /// Add a payload field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Destination for diagnostic entries.
pub trait DiagnosticSink: Send + Sync {
    /// Record an entry. Never fails from the caller's perspective.
    fn record(&self, event: ClientEvent);
}

/// Bounded in-memory diagnostic history, oldest entries evicted first.
#[derive(Debug)]
pub struct MemoryClientEventStore {
    capacity: usize,
    events: Mutex<VecDeque<ClientEvent>>,
}

impl MemoryClientEventStore {
    /// Create a store keeping at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries of a single kind, oldest first.
    #[must_use]
    pub fn events_of_kind(&self, kind: ClientEventKind) -> Vec<ClientEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for MemoryClientEventStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DiagnosticSink for MemoryClientEventStore {
    fn record(&self, event: ClientEvent) {
        tracing::debug!(kind = ?event.kind, text = %event.text, "client event");

        let Ok(mut events) = self.events.lock() else {
            tracing::error!("client event store lock poisoned, dropping entry");
            return;
        };

        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let store = MemoryClientEventStore::new(2);
        store.record(ClientEvent::new("one", ClientEventKind::LocationUpdate));
        store.record(ClientEvent::new("two", ClientEventKind::RegionMonitoring));
        store.record(ClientEvent::new("three", ClientEventKind::LocationUpdate));

        let texts: Vec<String> = store.events().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn test_filter_by_kind() {
        let store = MemoryClientEventStore::default();
        store.record(ClientEvent::new("a", ClientEventKind::LocationUpdate));
        store.record(ClientEvent::new("b", ClientEventKind::Settings));
        assert_eq!(store.events_of_kind(ClientEventKind::Settings).len(), 1);

        store.clear();
        assert!(store.events().is_empty());
    }

    #[test]
    fn test_payload_builder() {
        let event = ClientEvent::new("x", ClientEventKind::LocationUpdate)
            .with("event", "something")
            .with("count", 3);
        assert_eq!(event.payload["event"], "something");
        assert_eq!(event.payload["count"], 3);
    }
}
