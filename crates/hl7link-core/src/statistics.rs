//! Per-interface message counters.
//!
//! [`InterfaceStatistics`] is shared between an interface's worker task and
//! whoever monitors it, so every method takes `&self` and may be called
//! concurrently. Counters live in [`DashMap`]s keyed by message type; the
//! last-message timestamp sits behind a short-lived [`parking_lot::Mutex`].

use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants::FAILURE_KEY_ALL;

/// Success/failure counters for one interface.
#[derive(Debug)]
pub struct InterfaceStatistics {
    successes: DashMap<String, u64>,
    failures: DashMap<String, u64>,
    last_message: Mutex<Option<DateTime<Local>>>,
    started_at: Mutex<DateTime<Local>>,
}

impl InterfaceStatistics {
    /// Create empty statistics starting now.
    pub fn new() -> Self {
        Self {
            successes: DashMap::new(),
            failures: DashMap::new(),
            last_message: Mutex::new(None),
            started_at: Mutex::new(Local::now()),
        }
    }

    /// Count one successfully handled message of `message_type` and stamp the
    /// last-message time.
    pub fn add_success(&self, message_type: &str) {
        *self.successes.entry(message_type.to_string()).or_insert(0) += 1;
        *self.last_message.lock() = Some(Local::now());
    }

    /// Count one failure that could not be attributed to a message type.
    pub fn add_failure(&self) {
        self.add_failure_for(FAILURE_KEY_ALL);
    }

    /// Count one failure for `message_type`.
    pub fn add_failure_for(&self, message_type: &str) {
        *self.failures.entry(message_type.to_string()).or_insert(0) += 1;
    }

    /// Total successfully handled messages across all types.
    pub fn messages_received(&self) -> u64 {
        self.successes.iter().map(|entry| *entry.value()).sum()
    }

    /// Total failures across all keys.
    pub fn failures(&self) -> u64 {
        self.failures.iter().map(|entry| *entry.value()).sum()
    }

    /// Successes recorded for one message type.
    pub fn success_count(&self, message_type: &str) -> u64 {
        self.successes.get(message_type).map_or(0, |v| *v)
    }

    /// Failures recorded under one key.
    pub fn failure_count(&self, key: &str) -> u64 {
        self.failures.get(key).map_or(0, |v| *v)
    }

    /// Time of the most recent successful message.
    pub fn last_message_at(&self) -> Option<DateTime<Local>> {
        *self.last_message.lock()
    }

    pub fn started_at(&self) -> DateTime<Local> {
        *self.started_at.lock()
    }

    pub fn uptime(&self) -> Duration {
        (Local::now() - self.started_at())
            .to_std()
            .unwrap_or_default()
    }

    /// Whether a message arrived within the last `window`.
    ///
    /// An interface that has never received anything counts as healthy, so
    /// this returns `true` until the first message is recorded.
    pub fn has_received_message(&self, window: Duration) -> bool {
        match self.last_message_at() {
            None => true,
            Some(last) => match chrono::Duration::from_std(window) {
                Ok(window) => Local::now() - last <= window,
                Err(_) => true,
            },
        }
    }

    /// Add every counter from `other` into `self`.
    ///
    /// The last-message time becomes the later of the two.
    pub fn merge(&self, other: &InterfaceStatistics) {
        if std::ptr::eq(self, other) {
            return;
        }
        for entry in other.successes.iter() {
            *self.successes.entry(entry.key().clone()).or_insert(0) += *entry.value();
        }
        for entry in other.failures.iter() {
            *self.failures.entry(entry.key().clone()).or_insert(0) += *entry.value();
        }
        let theirs = other.last_message_at();
        let mut ours = self.last_message.lock();
        if theirs > *ours {
            *ours = theirs;
        }
    }

    /// Reset all counters and restart the uptime clock.
    pub fn clear(&self) {
        self.successes.clear();
        self.failures.clear();
        *self.last_message.lock() = None;
        *self.started_at.lock() = Local::now();
    }

    /// Point-in-time copy suitable for logging or serialization.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            successes: self
                .successes
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            failures: self
                .failures
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            messages_received: self.messages_received(),
            last_message_at: self.last_message_at(),
            started_at: self.started_at(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

impl Default for InterfaceStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of [`InterfaceStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub successes: BTreeMap<String, u64>,
    pub failures: BTreeMap<String, u64>,
    pub messages_received: u64,
    pub last_message_at: Option<DateTime<Local>>,
    pub started_at: DateTime<Local>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_by_type() {
        let stats = InterfaceStatistics::new();
        stats.add_success("ADT^A01");
        stats.add_success("ADT^A01");
        stats.add_success("ORU^R01");

        assert_eq!(stats.messages_received(), 3);
        assert_eq!(stats.success_count("ADT^A01"), 2);
        assert_eq!(stats.success_count("ORU^R01"), 1);
        assert_eq!(stats.success_count("SIU^S12"), 0);
        assert!(stats.last_message_at().is_some());
    }

    #[test]
    fn test_failures_default_key() {
        let stats = InterfaceStatistics::new();
        stats.add_failure();
        stats.add_failure();
        stats.add_failure_for("ADT^A01");

        assert_eq!(stats.failures(), 3);
        assert_eq!(stats.failure_count(FAILURE_KEY_ALL), 2);
        assert_eq!(stats.failure_count("ADT^A01"), 1);
        assert_eq!(stats.messages_received(), 0);
    }

    #[test]
    fn test_has_received_message_before_first() {
        let stats = InterfaceStatistics::new();
        assert!(stats.has_received_message(Duration::ZERO));
    }

    #[test]
    fn test_has_received_message_window() {
        let stats = InterfaceStatistics::new();
        stats.add_success("ADT^A01");
        assert!(stats.has_received_message(Duration::from_secs(60)));

        *stats.last_message.lock() = Some(Local::now() - chrono::Duration::seconds(120));
        assert!(!stats.has_received_message(Duration::from_secs(60)));
    }

    #[test]
    fn test_merge_sums_counters() {
        let a = InterfaceStatistics::new();
        let b = InterfaceStatistics::new();
        a.add_success("ADT^A01");
        b.add_success("ADT^A01");
        b.add_success("ORU^R01");
        b.add_failure();

        a.merge(&b);

        assert_eq!(a.success_count("ADT^A01"), 2);
        assert_eq!(a.success_count("ORU^R01"), 1);
        assert_eq!(a.failures(), 1);
        assert_eq!(b.messages_received(), 2);
    }

    #[test]
    fn test_clear() {
        let stats = InterfaceStatistics::new();
        stats.add_success("ADT^A01");
        stats.add_failure();
        stats.clear();

        assert_eq!(stats.messages_received(), 0);
        assert_eq!(stats.failures(), 0);
        assert!(stats.last_message_at().is_none());
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(InterfaceStatistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_success("ADT^A01");
                        stats.add_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.success_count("ADT^A01"), 8000);
        assert_eq!(stats.failures(), 8000);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = InterfaceStatistics::new();
        stats.add_success("ADT^A01");
        let snapshot = stats.snapshot();

        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.successes.get("ADT^A01"), Some(&1));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StatisticsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
