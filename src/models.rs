//! Per-stage value types for the ingestion pipeline.
//!
//! Each stage consumes the previous stage's output by value and produces a
//! new record type, so fields cannot drift between stages through shared
//! mutation. Identity throughout the pipeline is the attachment `id`.

use std::path::PathBuf;

use chrono::NaiveDate;

/// A PDF attachment discovered in the channel, flattened out of its parent
/// message. Produced by the fetch stage; immutable afterwards.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    /// Source-side file id (unique per attachment). The pipeline's natural key.
    pub id: String,
    /// Original file name as uploaded.
    pub name: String,
    /// Authenticated download URL.
    pub url: String,
    /// Size in bytes as reported by the source.
    pub size: i64,
    /// Permalink to the attachment, if the source provides one.
    pub permalink: Option<String>,
    /// Timestamp of the parent message (source-native string form).
    pub message_ts: String,
    /// Text of the parent message.
    pub message_text: String,
}

/// An attachment that is present on local disk. Produced by the download
/// stage; `local_path` existing is the stage's idempotency marker.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub attachment: AttachmentRef,
    pub local_path: PathBuf,
}

/// A downloaded file with its extracted text. `text` is the empty string
/// when extraction failed (failure is recorded, not propagated).
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub file: DownloadedFile,
    pub text: String,
    /// Byte length of `text`.
    pub text_length: usize,
    /// Sidecar `.txt` audit file, if it could be written.
    pub text_path: Option<PathBuf>,
}

/// An extracted document with inferred metadata. Both fields are optional:
/// absence means the inference service could not find the value in the
/// text, which is an expected outcome.
#[derive(Debug, Clone)]
pub struct EnrichedDocument {
    pub document: ExtractedDocument,
    pub title: Option<String>,
    pub publication_date: Option<NaiveDate>,
}

impl ExtractedDocument {
    /// Build the extracted record for `file`, computing the text length.
    pub fn new(file: DownloadedFile, text: String, text_path: Option<PathBuf>) -> Self {
        let text_length = text.len();
        Self {
            file,
            text,
            text_length,
            text_path,
        }
    }
}
