use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Kind of row in the notification log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AvailabilityAlert,
    LatencyAlert,
    Startup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AvailabilityAlert => "availability_alert",
            EventKind::LatencyAlert => "latency_alert",
            EventKind::Startup => "startup",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "availability_alert" => Some(EventKind::AvailabilityAlert),
            "latency_alert" => Some(EventKind::LatencyAlert),
            "startup" => Some(EventKind::Startup),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Option<i64>,
    pub timestamp: SystemTime,
    pub kind: EventKind,
    pub message: String,
}

impl EventRecord {
    pub fn new(timestamp: SystemTime, kind: EventKind, message: impl Into<String>) -> Self {
        Self { id: None, timestamp, kind, message: message.into() }
    }
}

/// A probe attempt as read back from the `checks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub id: i64,
    pub timestamp: SystemTime,
    pub url: String,
    pub ok: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub contains_malfunction: bool,
    pub error_text: Option<String>,
}

/// Rows removed by one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrunedRows {
    pub checks: u64,
    pub events: u64,
}

impl PrunedRows {
    pub fn total(&self) -> u64 {
        self.checks + self.events
    }
}
