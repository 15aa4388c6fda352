use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info};

use super::{Notifier, NotifyError};
use crate::clock::elapsed_between;
use crate::database::Database;
use crate::database::models::{EventKind, EventRecord};
use crate::database::state::{self, LAST_ALERT_AVAILABILITY, LAST_ALERT_LATENCY};

const STARTUP_GLYPH: &str = "🚀";

/// Alert kinds subject to cooldown. Each has its own cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Availability,
    Latency,
}

impl AlertKind {
    pub fn cooldown_key(&self) -> &'static str {
        match self {
            AlertKind::Availability => LAST_ALERT_AVAILABILITY,
            AlertKind::Latency => LAST_ALERT_LATENCY,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            AlertKind::Availability => "🚨",
            AlertKind::Latency => "🐢",
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            AlertKind::Availability => EventKind::AvailabilityAlert,
            AlertKind::Latency => EventKind::LatencyAlert,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Availability => write!(f, "availability"),
            AlertKind::Latency => write!(f, "latency"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Still inside the cooldown window of the previous alert of this kind
    Suppressed { remaining: Duration },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Nothing was recorded; the same alert may be retried on a later tick.
    #[error("{0}")]
    Transport(#[from] NotifyError),
    #[error("Failed to record notification: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

/// Cooldown-gated alert sending.
pub struct AlertDispatcher {
    database: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
    cooldown: Duration,
}

fn prefixed(glyph: &str, message: &str) -> String {
    format!("{glyph} {message}")
}

impl AlertDispatcher {
    pub fn new(database: Arc<dyn Database>, notifier: Arc<dyn Notifier>, cooldown: Duration) -> Self {
        Self { database, notifier, cooldown }
    }

    /// Send `message` unless an alert of the same kind went out less than
    /// one cooldown ago.
    ///
    /// The event row and the cooldown stamp are written only after the
    /// transport reports success.
    pub async fn notify(
        &self,
        kind: AlertKind,
        message: &str,
        now: SystemTime,
    ) -> Result<DispatchOutcome, DispatchError> {
        let db = self.database.as_ref();
        let key = kind.cooldown_key();

        if let Some(last) = state::read_timestamp(db, key).await.map_err(DispatchError::Persistence)? {
            let since_last = elapsed_between(last, now);
            if since_last < self.cooldown {
                let remaining = self.cooldown - since_last;
                debug!(%kind, remaining_ms = remaining.as_millis() as u64, "Alert suppressed by cooldown");
                return Ok(DispatchOutcome::Suppressed { remaining });
            }
        }

        let text = prefixed(kind.glyph(), message);
        self.notifier.send(&text).await?;

        db.insert_event(&EventRecord::new(now, kind.event_kind(), text))
            .await
            .map_err(DispatchError::Persistence)?;
        state::write_timestamp(db, key, now).await.map_err(DispatchError::Persistence)?;

        info!(%kind, "Alert sent");
        Ok(DispatchOutcome::Sent)
    }

    /// Startup notice. Never throttled and never touches a cooldown key.
    pub async fn notify_startup(&self, message: &str, now: SystemTime) -> Result<(), DispatchError> {
        let text = prefixed(STARTUP_GLYPH, message);
        self.notifier.send(&text).await?;

        self.database
            .insert_event(&EventRecord::new(now, EventKind::Startup, text))
            .await
            .map_err(DispatchError::Persistence)?;
        Ok(())
    }
}
