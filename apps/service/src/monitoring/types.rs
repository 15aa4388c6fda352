use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Outcome of one probe attempt.
///
/// Built through [`ProbeOutcome::response`] or
/// [`ProbeOutcome::transport_failure`], so exactly one of `status_code` and
/// `error_text` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// When the attempt finished
    pub timestamp: SystemTime,

    /// URL that was probed
    pub url: String,

    /// Status was 200 and the body did not contain the malfunction marker
    pub ok: bool,

    /// HTTP status code, absent when no response arrived
    pub status_code: Option<u16>,

    /// Wall time from request start to completion or failure
    pub latency_ms: u64,

    /// Body contained the malfunction marker
    pub contains_malfunction: bool,

    /// Transport error, if the request never produced a response
    pub error_text: Option<String>,
}

impl ProbeOutcome {
    /// An HTTP response was received and its body fully read.
    pub fn response(
        timestamp: SystemTime,
        url: impl Into<String>,
        status_code: u16,
        latency_ms: u64,
        contains_malfunction: bool,
    ) -> Self {
        Self {
            timestamp,
            url: url.into(),
            ok: status_code == 200 && !contains_malfunction,
            status_code: Some(status_code),
            latency_ms,
            contains_malfunction,
            error_text: None,
        }
    }

    /// The request failed before a usable response was read.
    pub fn transport_failure(
        timestamp: SystemTime,
        url: impl Into<String>,
        latency_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            url: url.into(),
            ok: false,
            status_code: None,
            latency_ms,
            contains_malfunction: false,
            error_text: Some(error.into()),
        }
    }
}

/// Final outcome of a retry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// The last attempt: the first success, or the final failure
    pub last: ProbeOutcome,
    /// Attempts made, between 1 and the configured retry count
    pub attempts: u32,
}

impl RetryOutcome {
    pub fn ok(&self) -> bool {
        self.last.ok
    }
}
