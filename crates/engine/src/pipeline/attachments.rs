// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attachment handling: download provider media into the group inbox,
//! attempt transcription for voice notes, and collect per-item failures
//! for the user-visible listing.

use super::MessagePipeline;
use dotclaw_adapters::{DownloadErrorKind, LocalAttachment};
use dotclaw_core::{Attachment, AttachmentKind, ChatId, Clock, QueuedMessage, RegisteredGroup};
use tracing::{debug, warn};

pub(super) struct FetchedAttachments {
    pub local: Vec<LocalAttachment>,
    /// Preformatted failure lines for the user-visible listing.
    pub failures: Vec<String>,
}

impl<C: Clock> MessagePipeline<C> {
    pub(super) async fn fetch_attachments(
        &self,
        chat_id: &ChatId,
        group: &RegisteredGroup,
        batch: &[QueuedMessage],
    ) -> FetchedAttachments {
        let mut fetched = FetchedAttachments {
            local: Vec::new(),
            failures: Vec::new(),
        };
        let Some(provider) = self.inner.deps.registry.resolve(chat_id) else {
            return fetched;
        };
        let max_bytes = provider.capabilities().max_attachment_bytes;
        let inbox = self
            .inner
            .deps
            .groups_dir
            .join(group.folder.as_str())
            .join("inbox");

        for row in batch {
            let log = self.inner.deps.store.read(|s| {
                s.messages
                    .get(chat_id.as_str())
                    .and_then(|log| {
                        log.iter()
                            .find(|m| m.id == row.message_id)
                            .and_then(|m| m.attachments_json.clone())
                    })
            });
            let Some(json) = log else { continue };
            let attachments: Vec<Attachment> = match serde_json::from_str(&json) {
                Ok(attachments) => attachments,
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "bad attachments_json");
                    continue;
                }
            };

            for attachment in attachments {
                if attachment.size_bytes.is_some_and(|size| size > max_bytes) {
                    fetched.failures.push(format!(
                        "{}: too large (limit {} MB)",
                        attachment.filename,
                        max_bytes / (1024 * 1024)
                    ));
                    continue;
                }
                match provider
                    .download_file(&attachment.provider_ref, &inbox, &attachment.filename)
                    .await
                {
                    Ok(path) => {
                        let transcription = if attachment.kind == AttachmentKind::Voice {
                            self.try_transcribe(&path).await
                        } else {
                            None
                        };
                        fetched.local.push(LocalAttachment {
                            kind: attachment.kind,
                            path,
                            transcription,
                        });
                    }
                    Err(e) => {
                        let reason = match e.kind {
                            DownloadErrorKind::TooLarge => format!(
                                "too large (limit {} MB)",
                                max_bytes / (1024 * 1024)
                            ),
                            DownloadErrorKind::Transient => {
                                "temporary download error, try sending it again".to_string()
                            }
                            DownloadErrorKind::Other => e.message.clone(),
                        };
                        fetched
                            .failures
                            .push(format!("{}: {}", attachment.filename, reason));
                    }
                }
            }
        }
        fetched
    }

    async fn try_transcribe(&self, path: &std::path::Path) -> Option<String> {
        let transcriber = self.inner.deps.transcriber.clone()?;
        match transcriber.transcribe(path).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "transcription failed");
                None
            }
        }
    }
}
