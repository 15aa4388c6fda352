use std::{env, fmt, time::Duration};

use thiserror::Error;
use url::Url;

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 120_000;
pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_ALERT_COOLDOWN_MS: u64 = 600_000;
pub const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_LATENCY_PERSISTENCE_MS: u64 = 600_000;
pub const DEFAULT_DATA_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TELEGRAM_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DB_FILE_PATH: &str = "monitor-data/monitor.db";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing env {0}")]
    Missing(&'static str),
    #[error("Invalid TARGET_URL {url:?}: {reason}")]
    InvalidTargetUrl { url: String, reason: String },
}

/// Telegram bot credentials.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub timeout_ms: u64,
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// The token is a credential; keep it out of debug output.
impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub malfunction_substring: String,
    pub telegram: TelegramConfig,
    pub check_interval_ms: u64,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub alert_cooldown_ms: u64,
    pub latency_threshold_ms: u64,
    pub latency_persistence_ms: u64,
    pub data_retention_days: u32,
    pub probe_timeout_ms: u64,
    pub db_file_path: String,
}

/// Parse `raw` or fall back to `default` when it is absent or malformed.
fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    match raw {
        Some(val) => val.trim().parse().unwrap_or(default),
        None => default,
    }
}

/// Like [`parse_or`], but zero also means "use the default".
fn parse_nonzero_or(raw: Option<String>, default: u64) -> u64 {
    match parse_or(raw, default) {
        0 => default,
        val => val,
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name).filter(|v| !v.is_empty()).ok_or(ConfigError::Missing(name))
}

fn validate_target_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTargetUrl { url: raw.to_string(), reason };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

/// `DB_FILE_PATH`, or the default location when unset or empty.
pub fn db_file_path(lookup: &impl Fn(&str) -> Option<String>) -> String {
    lookup("DB_FILE_PATH")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DB_FILE_PATH.to_string())
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// The four required values must be present and non-empty. Every numeric
    /// setting silently keeps its default when unset or unparsable. A zero
    /// timeout also keeps its default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let target_url = required(&lookup, "TARGET_URL")?;
        let malfunction_substring = required(&lookup, "MALFUNCTION_SUBSTRING")?;
        let bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let chat_id = required(&lookup, "TELEGRAM_CHAT_ID")?;

        validate_target_url(&target_url)?;

        Ok(Self {
            target_url,
            malfunction_substring,
            telegram: TelegramConfig {
                bot_token,
                chat_id,
                api_base: lookup("TELEGRAM_API_BASE")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
                timeout_ms: parse_nonzero_or(lookup("TELEGRAM_TIMEOUT_MS"), DEFAULT_TELEGRAM_TIMEOUT_MS),
            },
            check_interval_ms: parse_or(lookup("CHECK_INTERVAL_MS"), DEFAULT_CHECK_INTERVAL_MS),
            retry_count: parse_or(lookup("RETRY_COUNT"), DEFAULT_RETRY_COUNT),
            retry_base_delay_ms: parse_or(lookup("RETRY_BASE_DELAY_MS"), DEFAULT_RETRY_BASE_DELAY_MS),
            alert_cooldown_ms: parse_or(lookup("ALERT_COOLDOWN_MS"), DEFAULT_ALERT_COOLDOWN_MS),
            latency_threshold_ms: parse_or(lookup("LATENCY_THRESHOLD_MS"), DEFAULT_LATENCY_THRESHOLD_MS),
            latency_persistence_ms: parse_or(
                lookup("LATENCY_PERSISTENCE_MS"),
                DEFAULT_LATENCY_PERSISTENCE_MS,
            ),
            data_retention_days: parse_or(lookup("DATA_RETENTION_DAYS"), DEFAULT_DATA_RETENTION_DAYS),
            probe_timeout_ms: parse_nonzero_or(lookup("PROBE_TIMEOUT_MS"), DEFAULT_PROBE_TIMEOUT_MS),
            db_file_path: db_file_path(&lookup),
        })
    }

    pub fn check_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Observing URL: {}", self.target_url)?;
        write_title_1(f, "Checks")?;
        write_1(f, "Interval (ms)", &self.check_interval_ms)?;
        write_1(f, "Retries", &self.retry_count)?;
        write_1(f, "Retry base delay (ms)", &self.retry_base_delay_ms)?;
        write_1(f, "Probe timeout (ms)", &self.probe_timeout_ms)?;
        write_1(f, "Malfunction substring", &self.malfunction_substring)?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Cooldown (ms)", &self.alert_cooldown_ms)?;
        write_1(f, "Latency threshold (ms)", &self.latency_threshold_ms)?;
        write_1(f, "Latency persistence (ms)", &self.latency_persistence_ms)?;
        write_1(f, "Telegram chat", &self.telegram.chat_id)?;
        write_1(f, "Telegram timeout (ms)", &self.telegram.timeout_ms)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Database", &self.db_file_path)?;
        write_1(f, "Retention (days)", &self.data_retention_days)?;

        Ok(())
    }
}
