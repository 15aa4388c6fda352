use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notifier, NotifyError};
use crate::config::TelegramConfig;

/// Sends plain-text messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    /// Every request is bounded by `config.timeout()`; a stalled Bot API
    /// call surfaces as [`NotifyError::Network`].
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

/// No parse mode is set, so only line endings need normalising.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let text = normalize_newlines(text);
        let payload = TelegramMessage {
            chat_id: &self.config.chat_id,
            text: &text,
            disable_web_page_preview: true,
        };

        let response = self.client.post(self.endpoint()).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }

        Ok(())
    }
}
