use async_trait::async_trait;
use thiserror::Error;

pub mod dispatcher;
pub mod telegram;

pub use dispatcher::{AlertDispatcher, AlertKind, DispatchError, DispatchOutcome};
pub use telegram::TelegramNotifier;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification rejected: {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Outbound text channel used for alerts.
///
/// One call is one delivery attempt; retrying is up to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}
