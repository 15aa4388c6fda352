//! Shared tracing setup for the Uppe binaries.

mod subscriber;

pub use subscriber::init;
