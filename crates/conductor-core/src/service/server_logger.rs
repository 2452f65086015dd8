//! Per-provider in-memory log buffers

use crate::domain::LogEntry;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Maximum entries retained per provider; the oldest entry is evicted first
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Bounded per-provider log rings.
///
/// A buffer is created when its provider initializes and destroyed at
/// teardown. Appends to a provider without a buffer create one on demand,
/// so late-arriving notifications are never lost.
#[derive(Default)]
pub struct ServerLogger {
    buffers: RwLock<HashMap<String, VecDeque<LogEntry>>>,
}

impl ServerLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_buffer(&self, provider_id: &str) {
        self.buffers
            .write()
            .entry(provider_id.to_string())
            .or_default();
    }

    pub fn append(&self, provider_id: &str, message: impl Into<String>) {
        let mut buffers = self.buffers.write();
        let buffer = buffers.entry(provider_id.to_string()).or_default();
        buffer.push_back(LogEntry::new(message));
        while buffer.len() > MAX_LOG_ENTRIES {
            buffer.pop_front();
        }
    }

    /// Snapshot of a provider's entries, oldest first
    pub fn logs(&self, provider_id: &str) -> Vec<LogEntry> {
        self.buffers
            .read()
            .get(provider_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove_buffer(&self, provider_id: &str) {
        self.buffers.write().remove(provider_id);
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.buffers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read() {
        let logger = ServerLogger::new();
        logger.create_buffer("github");
        logger.append("github", "connected");
        logger.append("github", "listed 12 tools");

        let logs = logger.logs("github");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "connected");
        assert_eq!(logs[1].message, "listed 12 tools");
    }

    #[test]
    fn test_rotation_at_capacity() {
        let logger = ServerLogger::new();
        for i in 0..(MAX_LOG_ENTRIES + 1) {
            logger.append("github", format!("entry {i}"));
        }

        let logs = logger.logs("github");
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        // Entry 0 evicted, entry 1 is now oldest
        assert_eq!(logs[0].message, "entry 1");
        assert_eq!(logs[logs.len() - 1].message, format!("entry {MAX_LOG_ENTRIES}"));
    }

    #[test]
    fn test_buffers_are_isolated() {
        let logger = ServerLogger::new();
        logger.append("github", "a");
        logger.append("slack", "b");
        assert_eq!(logger.logs("github").len(), 1);
        assert_eq!(logger.logs("slack").len(), 1);

        logger.remove_buffer("github");
        assert!(logger.logs("github").is_empty());
        assert_eq!(logger.logs("slack").len(), 1);
    }
}
