//! Typed access to the reserved keys of the `state` table.
//!
//! On disk a timestamp is an epoch-millisecond string and the empty string
//! means "cleared". Callers only ever see `Option<SystemTime>`.

use anyhow::Result;
use std::time::SystemTime;

use super::Database;
use crate::clock::{from_millis, to_millis};

/// Start of the current high-latency run.
pub const LATENCY_DEGRADED_SINCE: &str = "latency_degraded_since";
/// Last dispatched availability alert.
pub const LAST_ALERT_AVAILABILITY: &str = "last_alert_availability";
/// Last dispatched latency alert.
pub const LAST_ALERT_LATENCY: &str = "last_alert_latency";

const CLEARED: &str = "";

/// Decode a stored value. Empty or non-numeric values read as unset.
pub fn decode_timestamp(raw: &str) -> Option<SystemTime> {
    raw.trim().parse::<i64>().ok().map(from_millis)
}

pub async fn read_timestamp(db: &dyn Database, key: &str) -> Result<Option<SystemTime>> {
    Ok(db.get_state(key).await?.as_deref().and_then(decode_timestamp))
}

pub async fn write_timestamp(db: &dyn Database, key: &str, at: SystemTime) -> Result<()> {
    db.set_state(key, &to_millis(at).to_string()).await
}

pub async fn clear_timestamp(db: &dyn Database, key: &str) -> Result<()> {
    db.set_state(key, CLEARED).await
}
