use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber at INFO unless `RUST_LOG` says otherwise.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    initialize_tracing(LevelFilter::INFO);
}

fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    // Read before the subscriber exists, so a failure here can only be reported afterwards.
    let log_format = var("RUST_LOG_FORMAT");

    let log_layer = match log_format.as_deref().unwrap_or_default() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer().compact().with_target(false).with_filter(env_filter).boxed(),
    };

    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if let Err(error) = log_format {
        if !matches!(error, std::env::VarError::NotPresent) {
            warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}");
        }
    }
}
