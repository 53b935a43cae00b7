use anyhow::Result;
use sqlx::SqlitePool;

/// Create the documents table and its indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL,
            title TEXT,
            publication_date TEXT,
            extracted_text_path TEXT,
            text_length INTEGER NOT NULL DEFAULT 0,
            source_url TEXT,
            message_ts TEXT,
            message_text TEXT,
            file_size INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_file_id ON documents(file_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_processed_at ON documents(processed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
