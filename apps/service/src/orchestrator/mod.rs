/// Orchestrator module - drives the watcher
///
/// The orchestrator owns every component and runs the tick sequence:
/// probe with retries, availability alert, degraded-latency tracking,
/// latency alert, retention. Ticks are single-flight: a tick requested while
/// another is still running is dropped.
pub mod messages;
pub mod retention;


pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::models::PrunedRows;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::{Checker, HttpChecker, LatencyStatus, LatencyTracker, RetryController};
use crate::notify::{AlertDispatcher, AlertKind, DispatchError, DispatchOutcome, Notifier, TelegramNotifier};
use crate::pool::LibsqlPool;

/// A tick that could not finish. The loop keeps running.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("Tick abandoned after persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

/// What happened to one alert within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDelivery {
    Sent,
    Suppressed { remaining: Duration },
    /// Transport failure; nothing was recorded so a later tick may retry
    Failed(String),
}

/// Summary of a completed tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub ok: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    pub availability_alert: Option<AlertDelivery>,
    pub latency: LatencyStatus,
    pub latency_alert: Option<AlertDelivery>,
    pub pruned: PrunedRows,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Another tick was still in flight
    Skipped,
    Completed(TickReport),
    Failed(TickError),
}

/// Clears the in-flight flag when the tick finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).ok().map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Main orchestrator for the watcher
pub struct Orchestrator {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    retry: RetryController,
    latency: LatencyTracker,
    dispatcher: AlertDispatcher,
    retention: RetentionCleanup,
    running: AtomicBool,
}

impl Orchestrator {
    /// Build the production stack on top of `pool` and run until Ctrl-C.
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        {
            let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            info!("Initializing database schema...");
            initialize_database(&conn).await?;
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let checker = Arc::new(HttpChecker::new(
            config.target_url.clone(),
            config.malfunction_substring.clone(),
            config.probe_timeout(),
            clock.clone(),
        )?);
        let notifier = Arc::new(TelegramNotifier::new(config.telegram.clone())?);

        let orchestrator = Arc::new(Self::new(config, database, checker, notifier, clock));
        orchestrator
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Shutdown requested");
            })
            .await;

        Ok(())
    }

    pub fn new(
        config: Config,
        database: Arc<dyn Database>,
        checker: Arc<dyn Checker>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryController::new(
            checker,
            database.clone(),
            config.retry_count,
            Duration::from_millis(config.retry_base_delay_ms),
        );
        let latency = LatencyTracker::new(
            database.clone(),
            config.latency_threshold_ms,
            Duration::from_millis(config.latency_persistence_ms),
        );
        let dispatcher = AlertDispatcher::new(database.clone(), notifier, config.alert_cooldown());
        let retention = RetentionCleanup::new(
            database,
            RetentionPolicy { data_retention_days: config.data_retention_days },
        );

        Self {
            config: Arc::new(config),
            clock,
            retry,
            latency,
            dispatcher,
            retention,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Send the unthrottled startup notice. Failures are logged only.
    pub async fn send_startup_notice(&self) {
        let now = self.clock.now();
        let message = messages::startup(&self.config.target_url, now);

        match self.dispatcher.notify_startup(&message, now).await {
            Ok(()) => info!("Startup notification sent"),
            Err(e) => error!("Failed to send startup notification: {}", e),
        }
    }

    /// Startup notice, then one tick immediately and one per interval until
    /// `shutdown` resolves.
    ///
    /// Each tick runs on its own task so that a tick outlasting the interval
    /// meets the single-flight guard instead of delaying the timer.
    pub async fn run_until(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        self.send_startup_notice().await;

        let mut timer = interval(self.config.check_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        log_tick(this.tick().await);
                    });
                }
            }
        }
    }

    /// Run one tick unless one is already in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_in_flight) = InFlight::acquire(&self.running) else {
            return TickOutcome::Skipped;
        };

        match self.run_tick().await {
            Ok(report) => TickOutcome::Completed(report),
            Err(e) => TickOutcome::Failed(e),
        }
    }

    async fn run_tick(&self) -> Result<TickReport, TickError> {
        let result = self.retry.run().await.map_err(TickError::Persistence)?;
        let probe = &result.last;
        let now = self.clock.now();

        let availability_alert = if result.ok() {
            None
        } else {
            let message = messages::availability(probe, now);
            error!("{}", message);
            Some(self.dispatch(AlertKind::Availability, &message, now).await?)
        };

        if self.latency.is_slow(probe) {
            warn!(
                "High latency observed: {}ms (> {}ms) for {}",
                probe.latency_ms,
                self.latency.threshold_ms(),
                probe.url
            );
        }

        let latency = self.latency.observe(probe, now).await.map_err(TickError::Persistence)?;

        let latency_alert = match latency.duration {
            Some(persisting) if latency.alert_worthy => {
                let message =
                    messages::latency(probe, persisting, self.latency.threshold_ms(), now);
                warn!("{}", message);
                Some(self.dispatch(AlertKind::Latency, &message, now).await?)
            }
            _ => None,
        };

        let pruned = self.retention.run(now).await.map_err(TickError::Persistence)?;

        Ok(TickReport {
            ok: result.ok(),
            attempts: result.attempts,
            latency_ms: probe.latency_ms,
            availability_alert,
            latency,
            latency_alert,
            pruned,
        })
    }

    /// Best-effort send: a transport failure is logged and reported, a
    /// persistence failure abandons the tick.
    async fn dispatch(
        &self,
        kind: AlertKind,
        message: &str,
        now: SystemTime,
    ) -> Result<AlertDelivery, TickError> {
        match self.dispatcher.notify(kind, message, now).await {
            Ok(DispatchOutcome::Sent) => Ok(AlertDelivery::Sent),
            Ok(DispatchOutcome::Suppressed { remaining }) => Ok(AlertDelivery::Suppressed { remaining }),
            Err(DispatchError::Transport(e)) => {
                error!("Failed to send {} alert: {}", kind, e);
                Ok(AlertDelivery::Failed(e.to_string()))
            }
            Err(DispatchError::Persistence(e)) => Err(TickError::Persistence(e)),
        }
    }
}

fn log_tick(outcome: TickOutcome) {
    match outcome {
        TickOutcome::Skipped => warn!("Previous check still in flight, skipping this tick"),
        TickOutcome::Completed(report) => debug!(
            ok = report.ok,
            attempts = report.attempts,
            latency_ms = report.latency_ms,
            "Tick completed"
        ),
        TickOutcome::Failed(e) => error!("{}", e),
    }
}
