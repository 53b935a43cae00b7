//! Stage 3: parallel text extraction over the downloaded set.
//!
//! Extraction is CPU-bound, so each file runs on a blocking worker with a
//! semaphore bounding the pool at min(configured max, available
//! parallelism). Results come back through indexed slots, so output order
//! always matches input order regardless of which worker finishes first.
//! A per-file extraction error degrades to empty text instead of failing
//! the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::{DownloadedFile, ExtractedDocument};

/// Effective pool size for `configured_max` workers.
pub fn pool_size(configured_max: usize) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    configured_max.min(available).max(1)
}

/// Extract text from every downloaded file, one output per input, in
/// input order. The pool fully drains before this returns.
pub async fn extract_documents(
    files: Vec<DownloadedFile>,
    max_workers: usize,
) -> Result<Vec<ExtractedDocument>> {
    let total = files.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(pool_size(max_workers)));
    let mut workers = JoinSet::new();

    for (index, file) in files.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        workers.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("extraction semaphore closed");
            (index, extract_one(file).await)
        });
    }

    // Indexed result slots keep the output aligned with the input even
    // though workers complete out of order.
    let mut slots: Vec<Option<ExtractedDocument>> = (0..total).map(|_| None).collect();
    while let Some(joined) = workers.join_next().await {
        let (index, doc) = joined.context("extraction worker failed")?;
        slots[index] = Some(doc);
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Extract one file's text and write its sidecar. Never fails: extraction
/// errors produce an empty-text document, sidecar errors are logged only.
async fn extract_one(file: DownloadedFile) -> ExtractedDocument {
    let path = file.local_path.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_pdf_text(&path)).await;

    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            eprintln!(
                "Warning: extraction failed for {}: {}",
                file.local_path.display(),
                e
            );
            String::new()
        }
        Err(e) => {
            eprintln!(
                "Warning: extraction worker for {} did not complete: {}",
                file.local_path.display(),
                e
            );
            String::new()
        }
    };

    let text_path = write_sidecar(&file.local_path, &text);
    ExtractedDocument::new(file, text, text_path)
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("PDF extraction failed for {}", path.display()))
}

/// Write the extracted text next to the source PDF for audit. Returns the
/// sidecar path, or `None` when the write failed.
fn write_sidecar(pdf_path: &Path, text: &str) -> Option<PathBuf> {
    let sidecar = pdf_path.with_extension("txt");
    match std::fs::write(&sidecar, text) {
        Ok(()) => Some(sidecar),
        Err(e) => {
            eprintln!("Warning: failed to write sidecar {}: {}", sidecar.display(), e);
            None
        }
    }
}
