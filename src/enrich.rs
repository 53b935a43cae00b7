//! Stage 4: sequential metadata enrichment with retry/backoff.
//!
//! Documents are processed strictly one at a time — the inference service
//! enforces a shared rate limit, and serializing is how this pipeline
//! respects it without a cross-task limiter. The retry behavior is factored
//! into [`RetryPolicy`] so its semantics are testable apart from the HTTP
//! call. One document's failure never aborts the batch: every input
//! produces exactly one output, degraded to `{None, None}` on exhaustion.

use std::time::Duration;

use crate::config::EnrichConfig;
use crate::metadata::{DocumentMetadata, InferenceError, MetadataInference};
use crate::models::{EnrichedDocument, ExtractedDocument};

/// Which inference failures are retried, how often, and with what delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per document (first call included).
    pub max_attempts: u32,
    /// Backoff seed for rate-limit errors; doubles per attempt.
    pub base_delay: Duration,
    /// Fixed delay for other transient service errors.
    pub service_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EnrichConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            service_delay: Duration::from_millis(config.service_delay_ms),
        }
    }

    /// Delay to wait before the next attempt, given that `attempts_made`
    /// attempts have already failed with `error`. `None` means give up:
    /// either the error category is not retryable or all attempts are used.
    pub fn next_delay(&self, error: &InferenceError, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }
        match error {
            // 1s, 2s, 4s, ... for the default base delay.
            InferenceError::RateLimited(_) => {
                Some(self.base_delay * 2u32.saturating_pow(attempts_made.saturating_sub(1)))
            }
            InferenceError::Service(_) => Some(self.service_delay),
            InferenceError::Malformed(_) | InferenceError::Other(_) => None,
        }
    }
}

/// Enrich every document, in order, one inference call at a time.
///
/// Empty-text documents are emitted as `{None, None}` without touching the
/// service. `inter_call_delay` is a courtesy pause between successive
/// documents, distinct from retry backoff.
pub async fn enrich_documents(
    inference: &dyn MetadataInference,
    docs: Vec<ExtractedDocument>,
    policy: &RetryPolicy,
    text_prefix_chars: usize,
    inter_call_delay: Duration,
) -> Vec<EnrichedDocument> {
    let total = docs.len();
    let mut enriched = Vec::with_capacity(total);

    for (i, document) in docs.into_iter().enumerate() {
        let metadata = if document.text.is_empty() {
            DocumentMetadata::default()
        } else {
            let prefix = truncate_chars(&document.text, text_prefix_chars);
            infer_with_retry(inference, prefix, policy).await
        };

        enriched.push(EnrichedDocument {
            document,
            title: metadata.title,
            publication_date: metadata.publication_date,
        });

        if i + 1 < total && !inter_call_delay.is_zero() {
            tokio::time::sleep(inter_call_delay).await;
        }
    }

    enriched
}

/// Run one document's inference under the retry policy. Exhaustion and
/// non-retryable errors both degrade to empty metadata.
async fn infer_with_retry(
    inference: &dyn MetadataInference,
    text: &str,
    policy: &RetryPolicy,
) -> DocumentMetadata {
    let mut attempts_made = 0u32;
    loop {
        attempts_made += 1;
        match inference.infer(text).await {
            Ok(metadata) => return metadata,
            Err(e) => match policy.next_delay(&e, attempts_made) {
                Some(delay) => {
                    eprintln!(
                        "Warning: inference attempt {}/{} failed ({}), retrying in {:?}",
                        attempts_made, policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    eprintln!(
                        "Warning: inference gave up after {} attempt(s): {}",
                        attempts_made, e
                    );
                    return DocumentMetadata::default();
                }
            },
        }
    }
}

/// Character-boundary-safe prefix of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
