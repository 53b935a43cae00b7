//! Stage 1: scan the channel for messages carrying PDF attachments.
//!
//! Resolves a channel name to its native id, pages through the channel
//! history with the source's opaque cursor, keeps only `application/pdf`
//! attachments, and flattens them into [`AttachmentRef`]s carrying the
//! parent message's timestamp and text.
//!
//! This stage holds no local state, so any transport or API error aborts
//! it — there are no partial results to resume from.

use anyhow::{bail, Result};

use crate::models::AttachmentRef;
use crate::source::{SourceApi, SourceFile, SourceMessage};

pub const MIME_PDF: &str = "application/pdf";

/// Resolve `channel` (name or native id) and return all PDF attachments in
/// its history, each message yielded at most once per run.
pub async fn fetch_pdf_attachments(
    api: &dyn SourceApi,
    channel: &str,
    page_size: u32,
) -> Result<Vec<AttachmentRef>> {
    // Native ids start with 'C'; anything else is treated as a name.
    let channel_id = if channel.starts_with('C') {
        channel.to_string()
    } else {
        resolve_channel_id(api, channel).await?
    };

    let mut attachments = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = api
            .history_page(&channel_id, page_size, cursor.as_deref())
            .await?;

        for message in &page.messages {
            attachments.extend(pdf_attachments(message));
        }

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    Ok(attachments)
}

/// Look up a channel id by exact name match.
async fn resolve_channel_id(api: &dyn SourceApi, name: &str) -> Result<String> {
    let channels = api.list_channels().await?;
    match channels.iter().find(|c| c.name == name) {
        Some(c) => Ok(c.id.clone()),
        None => bail!("Channel '{}' not found", name),
    }
}

/// Downselect one message's attachments to PDF entries, carrying through
/// the parent message's timestamp and text.
fn pdf_attachments(message: &SourceMessage) -> Vec<AttachmentRef> {
    let files = match &message.files {
        Some(files) => files,
        None => return Vec::new(),
    };

    files
        .iter()
        .filter(|f| f.mimetype.as_deref() == Some(MIME_PDF))
        .filter_map(|f| to_attachment_ref(f, message))
        .collect()
}

fn to_attachment_ref(file: &SourceFile, message: &SourceMessage) -> Option<AttachmentRef> {
    // An attachment without a download URL cannot be processed.
    let url = match &file.url_private {
        Some(u) => u.clone(),
        None => {
            eprintln!("Warning: PDF attachment {} has no download URL", file.id);
            return None;
        }
    };

    Some(AttachmentRef {
        id: file.id.clone(),
        name: file
            .name
            .clone()
            .unwrap_or_else(|| format!("{}.pdf", file.id)),
        url,
        size: file.size.unwrap_or(0),
        permalink: file.permalink.clone(),
        message_ts: message.ts.clone(),
        message_text: message.text.clone(),
    })
}
