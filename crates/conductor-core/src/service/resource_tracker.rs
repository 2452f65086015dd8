//! Provider-held resource bookkeeping.
//!
//! Scans tool output for resource identifiers and remembers when each was
//! last seen, so idle handles can be surfaced and eventually forgotten.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Idle time after which a tracked resource is evicted
pub const RESOURCE_TTL: Duration = Duration::from_secs(30 * 60);

/// Interval of the background sweep task
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Session,
    Connection,
    Handle,
}

/// Extraction patterns tried in order; the first match wins
static EXTRACTION_PATTERNS: Lazy<Vec<(ResourceType, Regex)>> = Lazy::new(|| {
    vec![
        (
            ResourceType::Session,
            Regex::new(r"Session ID:\s*([A-Za-z0-9._-]+)").unwrap(),
        ),
        (
            ResourceType::Connection,
            Regex::new(r"Connection ID:\s*([A-Za-z0-9._-]+)").unwrap(),
        ),
        (
            ResourceType::Handle,
            Regex::new(r"Handle:\s*([A-Za-z0-9._-]+)").unwrap(),
        ),
    ]
});

/// Snapshot of one tracked resource
#[derive(Debug, Clone, Serialize)]
pub struct TrackedResource {
    pub provider_id: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    /// Seconds since the resource was last seen in tool output
    pub idle_secs: u64,
}

#[derive(Default)]
pub struct ResourceTracker {
    resources: Mutex<HashMap<(String, ResourceType, String), Instant>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan tool output for a resource identifier.
    ///
    /// A re-sighting of a known resource bumps its last-used time.
    pub fn record_from_result(
        &self,
        provider_id: &str,
        text: &str,
    ) -> Option<(ResourceType, String)> {
        for (resource_type, pattern) in EXTRACTION_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(text) {
                let resource_id = captures.get(1)?.as_str().to_string();
                self.resources.lock().insert(
                    (provider_id.to_string(), *resource_type, resource_id.clone()),
                    Instant::now(),
                );
                return Some((*resource_type, resource_id));
            }
        }
        None
    }

    pub fn tracked_resources(&self) -> Vec<TrackedResource> {
        let now = Instant::now();
        self.resources
            .lock()
            .iter()
            .map(|((provider_id, resource_type, resource_id), last_used)| TrackedResource {
                provider_id: provider_id.clone(),
                resource_type: *resource_type,
                resource_id: resource_id.clone(),
                idle_secs: now.saturating_duration_since(*last_used).as_secs(),
            })
            .collect()
    }

    /// Drop resources idle longer than [`RESOURCE_TTL`]
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        self.resources
            .lock()
            .retain(|_, last_used| now.saturating_duration_since(*last_used) <= RESOURCE_TTL);
    }

    /// Spawn the periodic sweep; abort the handle at shutdown
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracker.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_first_match_wins() {
        let tracker = ResourceTracker::new();
        let extracted = tracker.record_from_result(
            "browser",
            "Opened page.\nSession ID: sess-42\nConnection ID: conn-9",
        );
        assert_eq!(extracted, Some((ResourceType::Session, "sess-42".to_string())));

        let resources = tracker.tracked_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_id, "sess-42");
    }

    #[test]
    fn test_no_match_tracks_nothing() {
        let tracker = ResourceTracker::new();
        assert!(tracker.record_from_result("browser", "plain output").is_none());
        assert!(tracker.tracked_resources().is_empty());
    }

    #[test]
    fn test_eviction_after_ttl() {
        let tracker = ResourceTracker::new();
        tracker.record_from_result("db", "Handle: h-1");

        let now = Instant::now();
        tracker.sweep_at(now + Duration::from_secs(10 * 60));
        assert_eq!(tracker.tracked_resources().len(), 1);

        tracker.sweep_at(now + Duration::from_secs(31 * 60));
        assert!(tracker.tracked_resources().is_empty());
    }

    #[test]
    fn test_resighting_bumps_last_used() {
        let tracker = ResourceTracker::new();
        tracker.record_from_result("db", "Connection ID: c-1");
        // Same resource seen again: still one entry
        tracker.record_from_result("db", "reusing Connection ID: c-1");
        assert_eq!(tracker.tracked_resources().len(), 1);
    }
}
