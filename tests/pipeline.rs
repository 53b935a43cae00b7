//! End-to-end pipeline tests with mock external collaborators.
//!
//! Exercises the full fetch → download → extract → enrich → persist flow
//! against an in-process message source, attachment transport, and
//! inference service, with a real SQLite store on disk.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use paperdrop::config::{Config, DbConfig, EnrichConfig, ExtractConfig, SourceConfig, StorageConfig};
use paperdrop::metadata::{DocumentMetadata, InferenceError, MetadataInference};
use paperdrop::migrate;
use paperdrop::pipeline::run_pipeline;
use paperdrop::progress::NoProgress;
use paperdrop::source::{
    AttachmentTransport, Channel, HistoryPage, SourceApi, SourceFile, SourceMessage,
};

/// Minimal valid PDF containing `phrase`, with correct xref offsets so
/// pdf-extract can parse it.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for o in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", o).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Channel with one PDF-bearing message and one plain message.
struct TwoMessageSource;

#[async_trait]
impl SourceApi for TwoMessageSource {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(vec![Channel {
            id: "C100".to_string(),
            name: "research".to_string(),
        }])
    }

    async fn history_page(
        &self,
        _channel_id: &str,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<HistoryPage> {
        Ok(HistoryPage {
            messages: vec![
                SourceMessage {
                    ts: "1700000000.000100".to_string(),
                    text: "annual report attached".to_string(),
                    files: Some(vec![SourceFile {
                        id: "FA001".to_string(),
                        name: Some("annual-review.pdf".to_string()),
                        mimetype: Some("application/pdf".to_string()),
                        url_private: Some("https://files.example/FA001".to_string()),
                        size: Some(1234),
                        permalink: Some("https://chat.example/p/FA001".to_string()),
                    }]),
                },
                SourceMessage {
                    ts: "1700000001.000200".to_string(),
                    text: "no attachments here".to_string(),
                    files: None,
                },
            ],
            has_more: false,
            next_cursor: None,
        })
    }
}

/// Channel with no qualifying messages at all.
struct EmptySource;

#[async_trait]
impl SourceApi for EmptySource {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(vec![Channel {
            id: "C100".to_string(),
            name: "research".to_string(),
        }])
    }

    async fn history_page(
        &self,
        _channel_id: &str,
        _limit: u32,
        _cursor: Option<&str>,
    ) -> Result<HistoryPage> {
        Ok(HistoryPage {
            messages: vec![],
            has_more: false,
            next_cursor: None,
        })
    }
}

/// Writes a parseable PDF for every URL and counts transfers.
struct PdfTransport {
    calls: AtomicUsize,
}

impl PdfTransport {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AttachmentTransport for PdfTransport {
    async fn fetch_to_file(&self, _url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(
            dest,
            minimal_pdf_with_phrase("Report 2024, Title: Annual Review"),
        )?;
        Ok(())
    }
}

/// Returns fixed metadata when the text mentions the expected title.
struct KeywordInference;

#[async_trait]
impl MetadataInference for KeywordInference {
    async fn infer(&self, text: &str) -> Result<DocumentMetadata, InferenceError> {
        if text.contains("Annual Review") {
            Ok(DocumentMetadata {
                title: Some("Annual Review".to_string()),
                publication_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            })
        } else {
            Ok(DocumentMetadata::default())
        }
    }
}

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("data").join("docs.sqlite"),
            readiness_attempts: 3,
            readiness_delay_secs: 0,
        },
        source: SourceConfig {
            channel: "research".to_string(),
            page_size: 100,
        },
        storage: StorageConfig {
            root: root.join("pdfs"),
        },
        extract: ExtractConfig { max_workers: 2 },
        enrich: EnrichConfig {
            inter_call_delay_ms: 0,
            base_delay_ms: 1,
            service_delay_ms: 1,
            ..EnrichConfig::default()
        },
    }
}

async fn setup(root: &Path) -> SqlitePool {
    let cfg = test_config(root);
    let pool = paperdrop::db::wait_for_store(&cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

async fn document_row(pool: &SqlitePool) -> sqlx::sqlite::SqliteRow {
    sqlx::query("SELECT * FROM documents WHERE file_id = 'FA001'")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn full_run_persists_one_document() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    let pool = setup(tmp.path()).await;
    let transport = PdfTransport::new();

    let summary = run_pipeline(
        &cfg,
        &TwoMessageSource,
        &transport,
        &KeywordInference,
        &pool,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.attachments, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.extracted, 1);
    assert!(summary.chars_extracted > 0);
    assert_eq!(summary.persisted, 1);

    let row = document_row(&pool).await;
    assert_eq!(row.get::<String, _>("file_name"), "annual-review.pdf");
    assert_eq!(row.get::<String, _>("title"), "Annual Review");
    assert_eq!(row.get::<String, _>("publication_date"), "2024-01-01");
    assert_eq!(row.get::<String, _>("message_ts"), "1700000000.000100");
    assert!(row.get::<i64, _>("text_length") > 0);

    // Sidecar and PDF both live under the storage root.
    let pdf_path = tmp.path().join("pdfs").join("FA001_annual-review.pdf");
    assert!(pdf_path.exists());
    assert!(pdf_path.with_extension("txt").exists());
}

#[tokio::test]
async fn second_run_updates_in_place_without_refetching() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    let pool = setup(tmp.path()).await;
    let transport = PdfTransport::new();

    run_pipeline(
        &cfg,
        &TwoMessageSource,
        &transport,
        &KeywordInference,
        &pool,
        &NoProgress,
    )
    .await
    .unwrap();
    let first = document_row(&pool).await;
    let first_processed: i64 = first.get("processed_at");
    let first_updated: i64 = first.get("updated_at");

    // Ensure the second run's write timestamp can advance.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let summary = run_pipeline(
        &cfg,
        &TwoMessageSource,
        &transport,
        &KeywordInference,
        &pool,
        &NoProgress,
    )
    .await
    .unwrap();
    assert_eq!(summary.persisted, 1);

    // Download happened exactly once across both runs.
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 1);

    let second = document_row(&pool).await;
    assert_eq!(second.get::<i64, _>("processed_at"), first_processed);
    assert!(second.get::<i64, _>("updated_at") > first_updated);
}

#[tokio::test]
async fn empty_channel_is_success_with_zero_counters() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    let pool = setup(tmp.path()).await;
    let transport = PdfTransport::new();

    let summary = run_pipeline(
        &cfg,
        &EmptySource,
        &transport,
        &KeywordInference,
        &pool,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.attachments, 0);
    assert_eq!(summary.persisted, 0);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn failing_inference_still_persists_with_nulls() {
    struct AlwaysMalformed;

    #[async_trait]
    impl MetadataInference for AlwaysMalformed {
        async fn infer(&self, _text: &str) -> Result<DocumentMetadata, InferenceError> {
            Err(InferenceError::Malformed("scrambled".to_string()))
        }
    }

    let tmp = TempDir::new().unwrap();
    let cfg = test_config(tmp.path());
    let pool = setup(tmp.path()).await;
    let transport = PdfTransport::new();

    let summary = run_pipeline(
        &cfg,
        &TwoMessageSource,
        &transport,
        &AlwaysMalformed,
        &pool,
        &NoProgress,
    )
    .await
    .unwrap();

    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.titles, 0);
    assert_eq!(summary.dates, 0);

    let row = document_row(&pool).await;
    assert_eq!(row.get::<Option<String>, _>("title"), None);
    assert_eq!(row.get::<Option<String>, _>("publication_date"), None);
}
