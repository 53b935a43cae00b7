//! Metadata inference provider.
//!
//! Defines the [`MetadataInference`] trait the enrich stage calls per
//! document, the error taxonomy its retry policy dispatches on, and
//! [`OpenAiInference`], the chat-completions implementation. A single call
//! makes exactly one attempt; retry and backoff live in the enrich stage
//! so they can be tested independently of the HTTP client.
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` — required when constructing [`OpenAiInference`].

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::EnrichConfig;

/// Title and publication date inferred from a document's text. Both
/// fields are optional: the service is instructed to return null rather
/// than guess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub publication_date: Option<NaiveDate>,
}

/// Failure modes of one inference attempt. The enrich stage retries
/// `RateLimited` with exponential backoff and `Service` with a fixed
/// delay; `Malformed` and `Other` are never retried.
#[derive(Debug)]
pub enum InferenceError {
    /// The service rejected the call for rate limiting (HTTP 429).
    RateLimited(String),
    /// A transient service-side failure (5xx, network error).
    Service(String),
    /// The response could not be parsed as the expected two-field object.
    Malformed(String),
    /// Anything else (auth failure, bad request).
    Other(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::RateLimited(e) => write!(f, "rate limited: {}", e),
            InferenceError::Service(e) => write!(f, "service error: {}", e),
            InferenceError::Malformed(e) => write!(f, "malformed response: {}", e),
            InferenceError::Other(e) => write!(f, "inference error: {}", e),
        }
    }
}

impl std::error::Error for InferenceError {}

/// One metadata-inference attempt over a document text prefix.
#[async_trait]
pub trait MetadataInference: Send + Sync {
    async fn infer(&self, text: &str) -> Result<DocumentMetadata, InferenceError>;
}

// ============ OpenAI implementation ============

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are a document metadata extraction assistant. \
Your task is to extract the document title and publication/creation date from the provided text.\n\n\
Return your response in JSON format with exactly these keys:\n\
- \"title\": The main title of the document (string, or null if not found)\n\
- \"publication_date\": The publication or creation date in ISO format YYYY-MM-DD (string, or null if not found)\n\n\
If you cannot find either field, return null for that field.\n\
Be precise and extract only what is clearly stated in the document.";

/// Chat-completions client requesting a strict two-key JSON object with
/// low temperature and a small output-token cap.
pub struct OpenAiInference {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl OpenAiInference {
    /// Build a client from config and the `OPENAI_API_KEY` environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not set, so a misconfigured run
    /// aborts before any work starts.
    pub fn new(config: &EnrichConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            api_base: OPENAI_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API base (used against local stubs).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MetadataInference for OpenAiInference {
    async fn infer(&self, text: &str) -> Result<DocumentMetadata, InferenceError> {
        let user_prompt = format!(
            "Extract the title and publication date from this document text:\n\n{}\n\n\
             Return JSON with \"title\" and \"publication_date\" fields.",
            text
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.1,
            "max_tokens": 200,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Service(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::RateLimited(body_text));
        }
        if status.is_server_error() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Service(format!("{}: {}", status, body_text)));
        }
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Other(format!("{}: {}", status, body_text)));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;

        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                InferenceError::Malformed("missing choices[0].message.content".to_string())
            })?;

        parse_metadata_response(content)
    }
}

/// Parse the model's JSON reply into [`DocumentMetadata`].
///
/// Anything that is not a JSON object is malformed. A date value that is
/// not strict ISO-8601 `YYYY-MM-DD` is dropped to null rather than stored
/// as a best-effort parse.
pub fn parse_metadata_response(content: &str) -> Result<DocumentMetadata, InferenceError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| InferenceError::Malformed(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| InferenceError::Malformed("response is not a JSON object".to_string()))?;

    let title = obj
        .get("title")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let publication_date = obj
        .get("publication_date")
        .and_then(|d| d.as_str())
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());

    Ok(DocumentMetadata {
        title,
        publication_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_fields() {
        let meta =
            parse_metadata_response(r#"{"title": "Annual Review", "publication_date": "2024-01-01"}"#)
                .unwrap();
        assert_eq!(meta.title.as_deref(), Some("Annual Review"));
        assert_eq!(
            meta.publication_date,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn null_fields_are_absent() {
        let meta =
            parse_metadata_response(r#"{"title": null, "publication_date": null}"#).unwrap();
        assert_eq!(meta, DocumentMetadata::default());
    }

    #[test]
    fn non_iso_date_stored_as_null() {
        for bad in ["January 2024", "2024", "01/02/2024", "2024-13-40"] {
            let meta = parse_metadata_response(&format!(
                r#"{{"title": "T", "publication_date": "{}"}}"#,
                bad
            ))
            .unwrap();
            assert_eq!(meta.publication_date, None, "date {:?} should not parse", bad);
        }
    }

    #[test]
    fn non_object_is_malformed() {
        let err = parse_metadata_response("not json at all").unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));

        let err = parse_metadata_response(r#"["title"]"#).unwrap_err();
        assert!(matches!(err, InferenceError::Malformed(_)));
    }

    #[test]
    fn empty_title_dropped() {
        let meta =
            parse_metadata_response(r#"{"title": "  ", "publication_date": null}"#).unwrap();
        assert_eq!(meta.title, None);
    }
}
