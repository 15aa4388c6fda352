use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::types::ProbeOutcome;
use crate::clock::elapsed_between;
use crate::database::Database;
use crate::database::state::{self, LATENCY_DEGRADED_SINCE};

/// What the tracker concluded for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStatus {
    /// Start of the current high-latency run, if one is in progress
    pub since: Option<SystemTime>,
    /// How long the run has lasted as of this tick
    pub duration: Option<Duration>,
    /// The run has lasted at least the persistence window
    pub alert_worthy: bool,
}

/// Persisted Normal/Degraded state machine for sustained high latency.
///
/// The run start is written once when latency first crosses the threshold
/// and is never refreshed while it stays above. Any failed probe or
/// in-threshold sample clears it.
pub struct LatencyTracker {
    database: Arc<dyn Database>,
    threshold_ms: u64,
    persistence: Duration,
}

impl LatencyTracker {
    pub fn new(database: Arc<dyn Database>, threshold_ms: u64, persistence: Duration) -> Self {
        Self { database, threshold_ms, persistence }
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Whether a single outcome counts as degraded.
    /// `latency_ms` is already rounded up, so sub-millisecond overruns count.
    pub fn is_slow(&self, outcome: &ProbeOutcome) -> bool {
        outcome.ok && outcome.latency_ms > self.threshold_ms
    }

    /// Apply one tick's outcome and report the resulting state.
    pub async fn observe(&self, outcome: &ProbeOutcome, now: SystemTime) -> Result<LatencyStatus> {
        let db = self.database.as_ref();

        if self.is_slow(outcome) {
            if state::read_timestamp(db, LATENCY_DEGRADED_SINCE).await?.is_none() {
                debug!(latency_ms = outcome.latency_ms, "Entering degraded latency");
                state::write_timestamp(db, LATENCY_DEGRADED_SINCE, now).await?;
            }
        } else {
            state::clear_timestamp(db, LATENCY_DEGRADED_SINCE).await?;
        }

        let since = state::read_timestamp(db, LATENCY_DEGRADED_SINCE).await?;
        let duration = since.map(|since| elapsed_between(since, now));
        let alert_worthy = duration.is_some_and(|d| d >= self.persistence);

        Ok(LatencyStatus { since, duration, alert_worthy })
    }
}
