use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::checker::Checker;
use super::types::RetryOutcome;
use crate::database::Database;

/// Delay before the next attempt after `failed_attempts` consecutive failures.
///
/// `base * 2^(failed_attempts - 1)`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1);
    let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Runs the checker up to `retry_count` times, persisting every attempt.
pub struct RetryController {
    checker: Arc<dyn Checker>,
    database: Arc<dyn Database>,
    retry_count: u32,
    base_delay: Duration,
}

impl RetryController {
    /// `retry_count` below 1 is treated as 1.
    pub fn new(
        checker: Arc<dyn Checker>,
        database: Arc<dyn Database>,
        retry_count: u32,
        base_delay: Duration,
    ) -> Self {
        Self { checker, database, retry_count: retry_count.max(1), base_delay }
    }

    /// Probe until the first healthy outcome or until attempts run out.
    ///
    /// Probe failures come back as data in the outcome. The only error is a
    /// failure to persist an attempt.
    pub async fn run(&self) -> Result<RetryOutcome> {
        let mut attempt = 0;

        loop {
            let outcome = self.checker.check().await;
            attempt += 1;
            self.database.insert_check(&outcome).await?;

            if outcome.ok {
                debug!(attempt, latency_ms = outcome.latency_ms, "Probe succeeded");
                return Ok(RetryOutcome { last: outcome, attempts: attempt });
            }

            if attempt >= self.retry_count {
                return Ok(RetryOutcome { last: outcome, attempts: attempt });
            }

            let delay = backoff_delay(self.base_delay, attempt);
            warn!(
                attempt,
                of = self.retry_count,
                status = ?outcome.status_code,
                error = outcome.error_text.as_deref().unwrap_or("-"),
                "Probe failed, retrying in {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
