use anyhow::{Result, anyhow};
use async_trait::async_trait;
use libsql::params;
use std::time::SystemTime;

use super::models::{CheckRecord, EventKind, EventRecord, PrunedRows};
use crate::clock::{from_millis, to_millis};
use crate::monitoring::types::ProbeOutcome;
use crate::pool::LibsqlPool;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Storage used by the watcher: a key-value state table plus the append-only
/// probe and notification logs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Append one probe attempt to the probe log.
    async fn insert_check(&self, outcome: &ProbeOutcome) -> Result<i64>;

    /// Append one dispatched notification to the event log.
    async fn insert_event(&self, event: &EventRecord) -> Result<i64>;

    /// Raw value stored under `key`, `None` if the key was never written.
    async fn get_state(&self, key: &str) -> Result<Option<String>>;

    /// Upsert `key`.
    async fn set_state(&self, key: &str, value: &str) -> Result<()>;

    /// Delete log rows strictly older than `now - retention_days`.
    async fn delete_old_data(&self, retention_days: u32, now: SystemTime) -> Result<PrunedRows>;

    /// Most recent probe rows, newest first.
    async fn recent_checks(&self, limit: usize) -> Result<Vec<CheckRecord>>;

    /// Most recent notification rows, newest first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>>;
}

/// Retention cutoff: anything stamped strictly before this is deleted.
/// Never earlier than the Unix epoch.
pub fn retention_cutoff(retention_days: u32, now: SystemTime) -> SystemTime {
    let keep_ms = i64::from(retention_days).saturating_mul(DAY_MS);
    from_millis(to_millis(now).saturating_sub(keep_ms))
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("failed to get database connection: {e}"))
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn insert_check(&self, outcome: &ProbeOutcome) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO checks (ts_ms, url, ok, status_code, latency_ms, contains_malfunction, error_text) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                to_millis(outcome.timestamp),
                outcome.url.clone(),
                if outcome.ok { 1 } else { 0 },
                outcome.status_code.map(|v| v as i64),
                outcome.latency_ms as i64,
                if outcome.contains_malfunction { 1 } else { 0 },
                outcome.error_text.clone()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn insert_event(&self, event: &EventRecord) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO events (ts_ms, type, message) VALUES (?, ?, ?)",
            params![to_millis(event.timestamp), event.kind.as_str(), event.message.clone()],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT value FROM state WHERE key = ?", params![key]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO state (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .await?;
        Ok(())
    }

    async fn delete_old_data(&self, retention_days: u32, now: SystemTime) -> Result<PrunedRows> {
        let conn = self.get_conn().await?;
        let cutoff = to_millis(retention_cutoff(retention_days, now));

        let checks = conn.execute("DELETE FROM checks WHERE ts_ms < ?", params![cutoff]).await?;
        let events = conn.execute("DELETE FROM events WHERE ts_ms < ?", params![cutoff]).await?;

        Ok(PrunedRows { checks, events })
    }

    async fn recent_checks(&self, limit: usize) -> Result<Vec<CheckRecord>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare("SELECT id, ts_ms, url, ok, status_code, latency_ms, contains_malfunction, error_text FROM checks ORDER BY ts_ms DESC, id DESC LIMIT ?")
            .await?;

        let mut rows = stmt.query(params![limit as i64]).await?;
        let mut results = Vec::new();

        while let Some(row) = rows.next().await? {
            results.push(CheckRecord {
                id: row.get(0)?,
                timestamp: from_millis(row.get(1)?),
                url: row.get(2)?,
                ok: row.get::<i64>(3)? != 0,
                status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
                latency_ms: row.get::<i64>(5)?.max(0) as u64,
                contains_malfunction: row.get::<i64>(6)? != 0,
                error_text: row.get(7)?,
            });
        }

        Ok(results)
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare("SELECT id, ts_ms, type, message FROM events ORDER BY ts_ms DESC, id DESC LIMIT ?")
            .await?;

        let mut rows = stmt.query(params![limit as i64]).await?;
        let mut results = Vec::new();

        while let Some(row) = rows.next().await? {
            let kind: String = row.get(2)?;
            results.push(EventRecord {
                id: Some(row.get(0)?),
                timestamp: from_millis(row.get(1)?),
                kind: EventKind::parse(&kind).ok_or_else(|| anyhow!("unknown event type {kind:?}"))?,
                message: row.get(3)?,
            });
        }

        Ok(results)
    }
}
