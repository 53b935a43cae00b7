//! Stage 5: upsert enriched documents into the store.
//!
//! Keyed by the attachment's `file_id` (unique constraint). First sight
//! inserts; every later sight updates the mutable projection in place,
//! keeping `processed_at` from the original insert. A per-record failure
//! is logged and excluded from the success count — the batch continues.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::EnrichedDocument;

/// Upsert every document; returns the number successfully written.
pub async fn persist_documents(pool: &SqlitePool, docs: &[EnrichedDocument]) -> u64 {
    let mut upserted = 0u64;

    for doc in docs {
        let now = chrono::Utc::now().timestamp();
        match upsert_document(pool, doc, now).await {
            Ok(()) => upserted += 1,
            Err(e) => {
                eprintln!(
                    "Warning: failed to persist {}: {}",
                    doc.document.file.attachment.id, e
                );
            }
        }
    }

    upserted
}

/// Upsert one document with `now` as the write timestamp. `processed_at`
/// is only set on insert; the conflict branch leaves it untouched.
pub async fn upsert_document(pool: &SqlitePool, doc: &EnrichedDocument, now: i64) -> Result<()> {
    let attachment = &doc.document.file.attachment;
    let text_path = doc
        .document
        .text_path
        .as_ref()
        .map(|p| p.display().to_string());
    let publication_date = doc.publication_date.map(|d| d.to_string());

    sqlx::query(
        r#"
        INSERT INTO documents (
            file_id, file_name, title, publication_date,
            extracted_text_path, text_length, source_url,
            message_ts, message_text, file_size, processed_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_id) DO UPDATE SET
            title = excluded.title,
            publication_date = excluded.publication_date,
            extracted_text_path = excluded.extracted_text_path,
            text_length = excluded.text_length,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&attachment.id)
    .bind(&attachment.name)
    .bind(&doc.title)
    .bind(&publication_date)
    .bind(&text_path)
    .bind(doc.document.text_length as i64)
    .bind(&attachment.permalink)
    .bind(&attachment.message_ts)
    .bind(&attachment.message_text)
    .bind(attachment.size)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::{AttachmentRef, DownloadedFile, EnrichedDocument, ExtractedDocument};
    use chrono::NaiveDate;
    use sqlx::Row;

    async fn test_pool() -> SqlitePool {
        // One connection: each in-memory SQLite connection is its own DB.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn enriched(id: &str, title: Option<&str>) -> EnrichedDocument {
        EnrichedDocument {
            document: ExtractedDocument::new(
                DownloadedFile {
                    attachment: AttachmentRef {
                        id: id.to_string(),
                        name: format!("{}.pdf", id),
                        url: String::new(),
                        size: 42,
                        permalink: Some("https://chat.example/p".to_string()),
                        message_ts: "1700000000.0".to_string(),
                        message_text: "see attached".to_string(),
                    },
                    local_path: format!("/data/{}_{}.pdf", id, id).into(),
                },
                "body text".to_string(),
                Some(format!("/data/{}_{}.txt", id, id).into()),
            ),
            title: title.map(str::to_string),
            publication_date: NaiveDate::from_ymd_opt(2024, 1, 1),
        }
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row_and_insert_timestamp() {
        let pool = test_pool().await;
        let doc = enriched("F1", Some("Annual Review"));

        upsert_document(&pool, &doc, 100).await.unwrap();
        let mut updated = enriched("F1", Some("Annual Review (rev)"));
        updated.publication_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        upsert_document(&pool, &updated, 200).await.unwrap();

        let rows = sqlx::query("SELECT * FROM documents WHERE file_id = ?")
            .bind("F1")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.get::<String, _>("title"), "Annual Review (rev)");
        assert_eq!(row.get::<String, _>("publication_date"), "2024-06-01");
        assert_eq!(row.get::<i64, _>("processed_at"), 100);
        assert_eq!(row.get::<i64, _>("updated_at"), 200);
    }

    #[tokio::test]
    async fn null_metadata_is_stored_as_null() {
        let pool = test_pool().await;
        let mut doc = enriched("F2", None);
        doc.publication_date = None;
        upsert_document(&pool, &doc, 100).await.unwrap();

        let row = sqlx::query("SELECT title, publication_date FROM documents WHERE file_id = ?")
            .bind("F2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<Option<String>, _>("title"), None);
        assert_eq!(row.get::<Option<String>, _>("publication_date"), None);
    }

    #[tokio::test]
    async fn batch_count_matches_successes() {
        let pool = test_pool().await;
        let docs = vec![enriched("F1", Some("A")), enriched("F2", Some("B"))];
        let count = persist_documents(&pool, &docs).await;
        assert_eq!(count, 2);

        // Re-running the same batch updates in place: still 2 successes,
        // still 2 rows.
        let count = persist_documents(&pool, &docs).await;
        assert_eq!(count, 2);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 2);
    }
}
