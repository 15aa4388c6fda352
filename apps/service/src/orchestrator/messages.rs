//! Plain-text bodies for the notifications and their console mirrors.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{Duration, SystemTime};

use crate::monitoring::ProbeOutcome;

fn iso(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn availability(outcome: &ProbeOutcome, now: SystemTime) -> String {
    let status = outcome.status_code.map_or_else(|| "N/A".to_string(), |code| code.to_string());
    [
        format!("Availability issue at {}", iso(now)),
        format!("URL: {}", outcome.url),
        format!("Status: {status}"),
        format!("Latency: {} ms", outcome.latency_ms),
        format!("Contains malfunction substring: {}", outcome.contains_malfunction),
        format!("Error: {}", outcome.error_text.as_deref().unwrap_or("n/a")),
    ]
    .join("\n")
}

pub fn latency(outcome: &ProbeOutcome, persisting: Duration, threshold_ms: u64, now: SystemTime) -> String {
    let secs = (persisting.as_millis() + 500) / 1000;
    [
        format!("High latency persisting {secs}s as of {}", iso(now)),
        format!("URL: {}", outcome.url),
        format!("Last latency: {} ms (threshold {threshold_ms} ms)", outcome.latency_ms),
    ]
    .join("\n")
}

pub fn startup(target_url: &str, now: SystemTime) -> String {
    [format!("Monitor started at {}", iso(now)), format!("URL: {target_url}")].join("\n")
}
