//! Chat-channel message source.
//!
//! Defines the [`SourceApi`] trait the fetch stage paginates against, the
//! [`AttachmentTransport`] trait the download stage pulls bytes through, and
//! [`SlackSource`], the HTTP implementation of both against the Slack Web
//! API. Stages depend only on the traits so tests can substitute mocks.
//!
//! # Environment Variables
//!
//! - `SLACK_BOT_TOKEN` — required; bearer token for all API and file requests.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

/// One channel from the list-channels call.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// A file attachment as reported on a message.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// A single channel message. `files` is absent on plain-text messages.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Option<Vec<SourceFile>>,
}

/// One page of channel history plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<SourceMessage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Paginated access to the message source. The fetch stage drives the
/// cursor loop; implementations only speak one page at a time.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// List all channels visible to the token (for name → id resolution).
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    /// Fetch one page of message history for a channel id.
    async fn history_page(
        &self,
        channel_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<HistoryPage>;
}

/// Transport for pulling attachment bytes to local disk. Split from
/// [`SourceApi`] so the download stage's idempotency can be tested by
/// counting transfers.
#[async_trait]
pub trait AttachmentTransport: Send + Sync {
    /// Download `url` to `dest`, streaming the body in chunks.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<()>;
}

// ============ Slack implementation ============

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack Web API client implementing both source traits.
pub struct SlackSource {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl SlackSource {
    /// Build a client from the `SLACK_BOT_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set — this is a configuration
    /// failure and the caller is expected to abort before any work starts.
    pub fn new() -> Result<Self> {
        let token = std::env::var("SLACK_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("SLACK_BOT_TOKEN environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            token,
            api_base: SLACK_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API base, for local stubs.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SourceMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[async_trait]
impl SourceApi for SlackSource {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let resp: ChannelListResponse = self
            .client
            .get(format!("{}/conversations.list", self.api_base))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("conversations.list request failed")?
            .error_for_status()?
            .json()
            .await
            .context("conversations.list returned invalid JSON")?;

        if !resp.ok {
            bail!(
                "conversations.list error: {}",
                resp.error.unwrap_or_else(|| "unknown".to_string())
            );
        }

        Ok(resp.channels)
    }

    async fn history_page(
        &self,
        channel_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<HistoryPage> {
        let mut req = self
            .client
            .get(format!("{}/conversations.history", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("channel", channel_id), ("limit", &limit.to_string())]);
        if let Some(c) = cursor {
            req = req.query(&[("cursor", c)]);
        }

        let resp: HistoryResponse = req
            .send()
            .await
            .context("conversations.history request failed")?
            .error_for_status()?
            .json()
            .await
            .context("conversations.history returned invalid JSON")?;

        if !resp.ok {
            bail!(
                "conversations.history error: {}",
                resp.error.unwrap_or_else(|| "unknown".to_string())
            );
        }

        Ok(HistoryPage {
            messages: resp.messages,
            has_more: resp.has_more,
            next_cursor: resp
                .response_metadata
                .and_then(|m| m.next_cursor)
                .filter(|c| !c.is_empty()),
        })
    }
}

#[async_trait]
impl AttachmentTransport for SlackSource {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let mut resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("download request failed: {}", url))?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;

        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
