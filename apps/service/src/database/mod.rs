/// Database abstraction layer
///
/// Persistent state for the watcher: the probe log (`checks`), the
/// notification log (`events`) and the key-value `state` table, stored in a
/// local LibSQL file.

pub mod migrations;
pub mod models;
pub mod repository;
pub mod state;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
