/// Probing engine
///
/// - `checker`: a single HTTP probe and its classification
/// - `retry`: bounded retries with exponential backoff
/// - `latency`: the persisted degraded-latency state machine
pub mod checker;
pub mod latency;
pub mod retry;
pub mod types;

pub use checker::{Checker, HttpChecker};
pub use latency::{LatencyStatus, LatencyTracker};
pub use retry::RetryController;
pub use types::{ProbeOutcome, RetryOutcome};
