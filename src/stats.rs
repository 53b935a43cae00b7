//! Store statistics overview.
//!
//! Quick summary of what has been ingested: document counts, metadata
//! coverage, extracted-text volume. Used by `paperdrop stats` to give
//! confidence that runs are landing in the store as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_documents,
            COUNT(title) AS with_title,
            COUNT(publication_date) AS with_date,
            COALESCE(SUM(text_length), 0) AS total_text_length,
            COALESCE(SUM(file_size), 0) AS total_file_size,
            MAX(processed_at) AS last_processed
        FROM documents
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let total_documents: i64 = row.get("total_documents");
    let with_title: i64 = row.get("with_title");
    let with_date: i64 = row.get("with_date");
    let total_text_length: i64 = row.get("total_text_length");
    let total_file_size: i64 = row.get("total_file_size");
    let last_processed: Option<i64> = row.get("last_processed");

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Paperdrop — Store Stats");
    println!("=======================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Documents:      {}", total_documents);
    println!(
        "  With title:     {} / {}",
        with_title, total_documents
    );
    println!(
        "  With date:      {} / {}",
        with_date, total_documents
    );
    println!("  Text extracted: {} chars", total_text_length);
    println!("  File bytes:     {}", format_bytes(total_file_size.max(0) as u64));
    println!(
        "  Last run:       {}",
        match last_processed {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
