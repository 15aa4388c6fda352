//! Uppe watch: probes one HTTP endpoint on a fixed interval and raises
//! debounced Telegram alerts when it is down or persistently slow.

pub mod clock;
pub mod config;
pub mod database;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod pool;

#[cfg(test)]
mod test_support;
