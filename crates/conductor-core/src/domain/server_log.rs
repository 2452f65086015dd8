//! Per-provider log entry type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a provider's in-memory log buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "msg")]
    pub message: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}
