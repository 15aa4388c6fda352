use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use uppe_watch::config::{self, Config};
use uppe_watch::database::{Database, DatabaseImpl, initialize_database};
use uppe_watch::orchestrator::Orchestrator;
use uppe_watch::pool::open_pool;

#[derive(Parser)]
#[command(version, about = "Watch one URL and alert on Telegram when it is down or slow")]
struct Cli {
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the watcher (default)
    Run,
    /// Print the most recent probes and notifications, then exit
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_env_file(path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("reading {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn iso(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn print_history(limit: usize) -> Result<()> {
    let db_path = config::db_file_path(&|name: &str| std::env::var(name).ok());
    let pool = open_pool(&db_path).await?;
    {
        let conn = pool.get().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        initialize_database(&conn).await?;
    }
    let database = DatabaseImpl::new_from_pool(pool);

    println!("Recent checks ({db_path}):");
    for check in database.recent_checks(limit).await? {
        let status = check.status_code.map_or_else(|| "---".to_string(), |c| c.to_string());
        println!(
            "  {} {} {} {:>6}ms{}{}",
            iso(check.timestamp),
            if check.ok { "ok  " } else { "FAIL" },
            status,
            check.latency_ms,
            if check.contains_malfunction { " malfunction" } else { "" },
            check.error_text.map(|e| format!(" {e}")).unwrap_or_default(),
        );
    }

    println!("Recent notifications:");
    for event in database.recent_events(limit).await? {
        let first_line = event.message.lines().next().unwrap_or_default();
        println!("  {} {:<18} {}", iso(event.timestamp), event.kind.as_str(), first_line);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    load_env_file(cli.env_file.as_ref())?;
    logger::init();

    match cli.command.unwrap_or(Command::Run) {
        Command::History { limit } => print_history(limit).await,
        Command::Run => {
            let config = Config::from_env()?;
            info!("{}", config);

            let pool = open_pool(&config.db_file_path).await?;
            Orchestrator::start(config, pool).await
        }
    }
}
