//! Age-based pruning of the probe and notification logs.
//!
//! Runs at the end of every tick. Rows stamped strictly before
//! `now - data_retention_days` are removed; the `state` table is never touched.

use anyhow::Result;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

use crate::database::Database;
use crate::database::models::PrunedRows;

/// How long log rows are kept
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub data_retention_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { data_retention_days: crate::config::DEFAULT_DATA_RETENTION_DAYS }
    }
}

/// Cleanup manager for expired rows
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    pub async fn run(&self, now: SystemTime) -> Result<PrunedRows> {
        let pruned = self.database.delete_old_data(self.policy.data_retention_days, now).await?;

        if pruned.total() > 0 {
            debug!(
                "Retention cleanup removed {} checks and {} events older than {} days",
                pruned.checks, pruned.events, self.policy.data_retention_days
            );
        }

        Ok(pruned)
    }
}
