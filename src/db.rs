//! SQLite connection and startup readiness probing.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Connect to the store, probing readiness with `SELECT 1` up to
/// `db.readiness_attempts` times with a fixed delay between attempts.
/// Exhaustion is fatal for the run.
pub async fn wait_for_store(config: &Config) -> Result<SqlitePool> {
    let attempts = config.db.readiness_attempts;
    let delay = Duration::from_secs(config.db.readiness_delay_secs);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match probe(config).await {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                eprintln!(
                    "Store not ready yet (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("store readiness probe failed")))
        .with_context(|| format!("store not reachable after {} attempts", attempts))
}

async fn probe(config: &Config) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}
