//! Fakes and fixtures shared by the unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tempfile::{TempDir, tempdir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock, from_millis, to_millis};
use crate::database::models::{CheckRecord, EventRecord, PrunedRows};
use crate::database::repository::retention_cutoff;
use crate::database::{Database, DatabaseImpl};
use crate::monitoring::{Checker, ProbeOutcome};
use crate::notify::{Notifier, NotifyError};
use crate::pool::open_pool;

pub const TEST_URL: &str = "https://status.example.com/health";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Real LibSQL database in a temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the database is used.
pub async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
    let dir = tempdir()?;
    let pool = open_pool(dir.path().join("test.db")).await?;

    let conn = pool.get().await.map_err(|e| anyhow!("{e}"))?;
    crate::database::initialize_database(&conn).await?;
    drop(conn);

    Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), dir))
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Start at the given number of milliseconds after the Unix epoch.
    pub fn at_millis(ms: i64) -> Self {
        Self::new(from_millis(ms))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
struct MemoryInner {
    checks: Vec<ProbeOutcome>,
    events: Vec<EventRecord>,
    state: HashMap<String, String>,
    state_writes: usize,
    fail_writes: bool,
    fail_reads: bool,
}

/// In-memory `Database` with switchable failures.
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<MemoryInner>,
}

impl MemoryDatabase {
    pub fn check_count(&self) -> usize {
        lock(&self.inner).checks.len()
    }

    pub fn checks(&self) -> Vec<ProbeOutcome> {
        lock(&self.inner).checks.clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        lock(&self.inner).events.clone()
    }

    pub fn state(&self, key: &str) -> Option<String> {
        lock(&self.inner).state.get(key).cloned()
    }

    /// Write state without counting it as a write by the code under test.
    pub fn seed_state(&self, key: &str, value: &str) {
        lock(&self.inner).state.insert(key.to_string(), value.to_string());
    }

    pub fn state_writes(&self) -> usize {
        lock(&self.inner).state_writes
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.inner).fail_reads = fail;
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        let inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(anyhow!("database is locked"));
        }
        Ok(inner)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert_check(&self, outcome: &ProbeOutcome) -> Result<i64> {
        let mut inner = self.writable()?;
        inner.checks.push(outcome.clone());
        Ok(inner.checks.len() as i64)
    }

    async fn insert_event(&self, event: &EventRecord) -> Result<i64> {
        let mut inner = self.writable()?;
        let id = inner.events.len() as i64 + 1;
        inner.events.push(EventRecord { id: Some(id), ..event.clone() });
        Ok(id)
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let inner = lock(&self.inner);
        if inner.fail_reads {
            return Err(anyhow!("disk I/O error"));
        }
        Ok(inner.state.get(key).cloned())
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.writable()?;
        inner.state.insert(key.to_string(), value.to_string());
        inner.state_writes += 1;
        Ok(())
    }

    async fn delete_old_data(&self, retention_days: u32, now: SystemTime) -> Result<PrunedRows> {
        let mut inner = self.writable()?;
        let cutoff = to_millis(retention_cutoff(retention_days, now));

        let before = (inner.checks.len(), inner.events.len());
        inner.checks.retain(|c| to_millis(c.timestamp) >= cutoff);
        inner.events.retain(|e| to_millis(e.timestamp) >= cutoff);

        Ok(PrunedRows {
            checks: (before.0 - inner.checks.len()) as u64,
            events: (before.1 - inner.events.len()) as u64,
        })
    }

    async fn recent_checks(&self, limit: usize) -> Result<Vec<CheckRecord>> {
        let inner = lock(&self.inner);
        Ok(inner
            .checks
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(i, c)| CheckRecord {
                id: i as i64 + 1,
                timestamp: c.timestamp,
                url: c.url.clone(),
                ok: c.ok,
                status_code: c.status_code,
                latency_ms: c.latency_ms,
                contains_malfunction: c.contains_malfunction,
                error_text: c.error_text.clone(),
            })
            .collect())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        Ok(lock(&self.inner).events.iter().rev().take(limit).cloned().collect())
    }
}

/// What a [`ScriptedChecker`] returns for one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// 200 with a clean body and the given latency
    Healthy(u64),
    /// Connection-level failure
    Fail,
    /// 200 whose body contains the malfunction marker
    Malfunction,
    /// Any other status code
    Status(u16),
    /// Sleep, then answer healthy with the given latency
    Stall(Duration, u64),
}

/// Checker that replays a script; the last step repeats once it runs out.
pub struct ScriptedChecker {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: Mutex<Vec<tokio::time::Instant>>,
    clock: Arc<dyn Clock>,
}

impl ScriptedChecker {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_clock(steps, Arc::new(SystemClock))
    }

    pub fn with_clock(steps: Vec<Step>, clock: Arc<dyn Clock>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Replace the remaining script.
    pub fn script(&self, steps: Vec<Step>) {
        *lock(&self.steps) = steps.into();
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn call_instants(&self) -> Vec<tokio::time::Instant> {
        lock(&self.calls).clone()
    }

    fn next_step(&self) -> Step {
        let next = lock(&self.steps).pop_front();
        let mut last = lock(&self.last);
        if let Some(step) = next {
            *last = Some(step);
        }
        last.clone().unwrap_or(Step::Fail)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self) -> ProbeOutcome {
        lock(&self.calls).push(tokio::time::Instant::now());

        match self.next_step() {
            Step::Healthy(latency) => ProbeOutcome::response(self.clock.now(), TEST_URL, 200, latency, false),
            Step::Fail => ProbeOutcome::transport_failure(self.clock.now(), TEST_URL, 5, "scripted failure"),
            Step::Malfunction => ProbeOutcome::response(self.clock.now(), TEST_URL, 200, 50, true),
            Step::Status(code) => ProbeOutcome::response(self.clock.now(), TEST_URL, code, 50, false),
            Step::Stall(wait, latency) => {
                tokio::time::sleep(wait).await;
                ProbeOutcome::response(self.clock.now(), TEST_URL, 200, latency, false)
            }
        }
    }
}

/// Notifier that records what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl RecordingNotifier {
    /// Fail the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Successfully delivered messages, in order.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifyError::Rejected { status: 502, body: "Bad Gateway".into() });
        }

        lock(&self.sent).push(text.to_string());
        Ok(())
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

async fn respond(socket: &mut tokio::net::TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} Scripted\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Serve exactly one HTTP response on a local port.
///
/// Returns the base URL (`http://127.0.0.1:<port>`) and the server task.
pub async fn serve_http_once(status: u16, body: &'static str) -> (String, JoinHandle<()>) {
    let (base, handle) = capture_http_once(status, body).await;
    let handle = tokio::spawn(async move {
        let _ = handle.await;
    });
    (base, handle)
}

/// Like [`serve_http_once`], but the task yields the raw request text.
pub async fn capture_http_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept test connection");
        let request = read_request(&mut socket).await;
        respond(&mut socket, status, body).await;
        request
    });

    (format!("http://{addr}"), handle)
}

/// Accepts one connection and never answers it.
pub async fn silent_http_listener() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.expect("accept test connection");
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    (format!("http://{addr}"), handle)
}

#[test]
fn manual_clock_advances() {
    let clock = ManualClock::at_millis(1_000);
    clock.advance(Duration::from_millis(500));
    assert_eq!(to_millis(clock.now()), 1_500);
}
