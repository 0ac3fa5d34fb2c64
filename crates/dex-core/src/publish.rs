//! Attachment publication
//!
//! Produced files become metadata attachments on the dataset. The publisher
//! works from the attachment list snapshot taken at run start and PATCHes
//! the full list after every upload, so an interrupted run still leaves the
//! files uploaded so far registered. Attachments added by someone else
//! between snapshot and PATCH are lost; re-snapshotting per file would only
//! narrow that window, not close it.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::types::Attachment;
use crate::api::DatasetClient;
use crate::error::Result;

/// Kind marker the platform expects on file attachments
const FILE_ATTACHMENT_KIND: &str = "file";

/// Replace an attachment by name, appending the new entry at the end
pub(crate) fn replace_attachment(attachments: &mut Vec<Attachment>, entry: Attachment) {
    attachments.retain(|a| a.name != entry.name);
    attachments.push(entry);
}

/// Publishes produced files onto the dataset, one PATCH per file
pub struct Publisher<'a> {
    client: &'a DatasetClient,
    href: &'a str,
    label: &'a str,
    attachments: Vec<Attachment>,
    cancel: CancellationToken,
}

impl<'a> Publisher<'a> {
    pub fn new(
        client: &'a DatasetClient,
        href: &'a str,
        label: &'a str,
        snapshot: Vec<Attachment>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            href,
            label,
            attachments: snapshot,
            cancel,
        }
    }

    /// Upload one file and register it, or skip it after cancellation
    ///
    /// Returns whether the file was actually published.
    pub async fn publish(&mut self, path: &Path) -> Result<bool> {
        if self.cancel.is_cancelled() {
            debug!(path = %path.display(), "cancellation requested, skipping upload");
            return Ok(false);
        }

        let mut entry = self.client.upload_attachment(self.href, path).await?;
        entry.kind = Some(FILE_ATTACHMENT_KIND.to_string());
        entry.title = Some(self.label.to_string());
        info!(name = %entry.name, "attachment uploaded");

        replace_attachment(&mut self.attachments, entry);
        self.client
            .patch_attachments(self.href, &self.attachments)
            .await?;
        Ok(true)
    }
}
