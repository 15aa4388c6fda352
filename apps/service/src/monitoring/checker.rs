use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::ProbeOutcome;
use crate::clock::Clock;

/// Performs a single probe of the watched endpoint.
///
/// Implementations never fail: every outcome, including transport errors,
/// is reported as a [`ProbeOutcome`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

/// Whole milliseconds, rounded up.
///
/// The degraded rule is `latency_ms > threshold` against an integer
/// threshold, so a 2000.3 ms probe must count as 2001 ms.
pub fn latency_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros().div_ceil(1_000)).unwrap_or(u64::MAX)
}

/// HTTP GET checker with body-content classification.
pub struct HttpChecker {
    client: reqwest::Client,
    target: String,
    malfunction_substring: String,
    clock: Arc<dyn Clock>,
}

impl HttpChecker {
    pub fn new(
        target: impl Into<String>,
        malfunction_substring: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            target: target.into(),
            malfunction_substring: malfunction_substring.into(),
            clock,
        })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self) -> ProbeOutcome {
        let start = Instant::now();
        let elapsed_ms = |start: Instant| latency_millis(start.elapsed());

        let response = match self.client.get(&self.target).send().await {
            Ok(response) => response,
            Err(e) => {
                return ProbeOutcome::transport_failure(
                    self.clock.now(),
                    &self.target,
                    elapsed_ms(start),
                    format!("HTTP request failed: {e}"),
                );
            }
        };

        let status_code = response.status().as_u16();

        // Latency covers the whole body, not just the headers.
        match response.text().await {
            Ok(body) => ProbeOutcome::response(
                self.clock.now(),
                &self.target,
                status_code,
                elapsed_ms(start),
                body.contains(&self.malfunction_substring),
            ),
            Err(e) => ProbeOutcome::transport_failure(
                self.clock.now(),
                &self.target,
                elapsed_ms(start),
                format!("Failed to read response body: {e}"),
            ),
        }
    }
}
