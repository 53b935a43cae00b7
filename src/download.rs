//! Stage 2: download PDF attachments to local storage.
//!
//! Files are content-addressed by `{id}_{name}`, which doubles as the
//! pipeline's primary resumability mechanism: a file already present on
//! disk is reused without touching the network, so a crashed run can be
//! re-executed safely. A failed download drops that attachment from the
//! output and continues with the rest.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::{AttachmentRef, DownloadedFile};
use crate::source::AttachmentTransport;

/// Derived on-disk file name for an attachment. Path separators in the
/// uploaded name are flattened so the name cannot escape the storage root.
pub fn storage_file_name(attachment: &AttachmentRef) -> String {
    let safe_name = attachment.name.replace(['/', '\\'], "_");
    format!("{}_{}", attachment.id, safe_name)
}

/// Download every attachment into `root`, skipping files already on disk.
///
/// Returns one [`DownloadedFile`] per attachment that is present locally
/// after the stage, in input order minus failures.
pub async fn download_attachments(
    transport: &dyn AttachmentTransport,
    attachments: Vec<AttachmentRef>,
    root: &Path,
) -> Result<Vec<DownloadedFile>> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create storage dir {}", root.display()))?;

    let mut downloaded = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        match download_one(transport, &attachment, root).await {
            Ok(local_path) => downloaded.push(DownloadedFile {
                attachment,
                local_path,
            }),
            Err(e) => {
                eprintln!(
                    "Warning: failed to download {} ({}): {}",
                    attachment.name, attachment.id, e
                );
            }
        }
    }

    Ok(downloaded)
}

async fn download_one(
    transport: &dyn AttachmentTransport,
    attachment: &AttachmentRef,
    root: &Path,
) -> Result<PathBuf> {
    let path = root.join(storage_file_name(attachment));

    // Idempotency: an existing file is the marker that this attachment was
    // already fetched on a previous run.
    if path.exists() {
        return Ok(path);
    }

    transport.fetch_to_file(&attachment.url, &path).await?;
    Ok(path)
}
