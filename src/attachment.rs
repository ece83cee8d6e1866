//! Inline resolution of remote image attachments.
//!
//! The messaging CLI describes an incoming remote attachment as
//! `[remote attachment: <filename>](<url>)`. When the filename is a raster
//! image the resolver downloads it through the [`Collaborator`], inlines it
//! as base64 and publishes a combined text+image trigger. Anything that is
//! not an image attachment is left to ordinary text handling.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use regex::Regex;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collaborator::Collaborator;
use crate::config::BridgeConfig;
use crate::host::{HostMessage, InboundMeta, MessageContent, Priority};
use crate::models::event::InboundMessage;
use crate::{AppError, Result};

/// Raster image extensions that are inlined (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

const MAX_FILENAME_CHARS: usize = 100;

const ATTACHMENT_PATTERN: &str =
    r"(?i)\[\s*remote attachment:\s*(?P<filename>[^\]]*?)\s*\]\s*\(\s*(?P<url>[^)\s]+)\s*\)";

/// Parsed `[remote attachment: …](…)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAttachmentRef {
    /// Filename as sent.
    pub filename: String,
    /// Download URL.
    pub url: String,
}

impl RemoteAttachmentRef {
    /// MIME type when the filename is an inlinable image.
    #[must_use]
    pub fn image_mime_type(&self) -> Option<&'static str> {
        image_mime_type(Path::new(&self.filename))
    }
}

fn attachment_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ATTACHMENT_PATTERN).ok())
        .as_ref()
}

/// Find a remote attachment reference in message content.
#[must_use]
pub fn parse_remote_attachment(content: &str) -> Option<RemoteAttachmentRef> {
    let captures = attachment_pattern()?.captures(content)?;
    let filename = captures.name("filename")?.as_str().trim();
    let url = captures.name("url")?.as_str();
    if filename.is_empty() {
        return None;
    }
    Some(RemoteAttachmentRef {
        filename: filename.to_owned(),
        url: url.to_owned(),
    })
}

/// MIME type for an image path, by extension.
#[must_use]
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Reduce a remote filename to something safe to join onto a local directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let truncated: String = trimmed.chars().rev().take(MAX_FILENAME_CHARS).collect();
    let truncated: String = truncated.chars().rev().collect();
    if truncated.is_empty() {
        "attachment".to_owned()
    } else {
        truncated
    }
}

/// Downloads and inlines image attachments.
pub struct AttachmentResolver {
    collaborator: Arc<dyn Collaborator>,
    dir: PathBuf,
    max_bytes: u64,
}

impl std::fmt::Debug for AttachmentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentResolver")
            .field("dir", &self.dir)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl AttachmentResolver {
    /// Resolver writing temporary files under `dir`.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, dir: PathBuf, max_bytes: u64) -> Self {
        Self {
            collaborator,
            dir,
            max_bytes,
        }
    }

    /// Resolver using the configured directory and size cap.
    #[must_use]
    pub fn from_config(collaborator: Arc<dyn Collaborator>, config: &BridgeConfig) -> Self {
        Self::new(
            collaborator,
            config.attachments_dir(),
            config.attachments.max_bytes,
        )
    }

    /// Build the publish for `message` if it carries an image attachment.
    ///
    /// Returns `None` when the message should be handled as plain text. A
    /// failed download still yields a message: a text notice in place of
    /// the image.
    pub async fn resolve(&self, message: &InboundMessage) -> Option<HostMessage> {
        let reference = parse_remote_attachment(&message.content)?;
        let mime_type = reference.image_mime_type()?;

        let span = info_span!(
            "resolve_attachment",
            message_id = %message.id,
            filename = %reference.filename,
        );

        async move {
            match self.fetch(&reference).await {
                Ok(data) => {
                    debug!(bytes = data.len(), "attachment inlined");
                    Some(HostMessage {
                        priority: Priority::Normal,
                        trigger_turn: true,
                        content: vec![
                            MessageContent::text(format!(
                                "[{}] sent an image: {}",
                                message.sender_inbox_id, reference.filename
                            )),
                            MessageContent::Image {
                                data,
                                mime_type: mime_type.to_owned(),
                            },
                        ],
                        meta: Some(InboundMeta::from(message)),
                    })
                }
                Err(err) => {
                    warn!(%err, "attachment could not be downloaded");
                    Some(HostMessage {
                        priority: Priority::Normal,
                        trigger_turn: true,
                        content: vec![MessageContent::text(format!(
                            "[{}] sent an attachment ({}) but it could not be downloaded: {err}",
                            message.sender_inbox_id, reference.filename
                        ))],
                        meta: Some(InboundMeta::from(message)),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn fetch(&self, reference: &RemoteAttachmentRef) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(format!(
            "{}-{}",
            Uuid::new_v4(),
            sanitize_filename(&reference.filename)
        ));

        let result = self.download_and_read(&reference.url, &dest).await;
        if let Err(err) = tokio::fs::remove_file(&dest).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %dest.display(), %err, "failed to remove temporary attachment");
            }
        }
        let bytes = result?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    async fn download_and_read(&self, url: &str, dest: &Path) -> Result<Vec<u8>> {
        self.collaborator.download(url, dest).await?;
        let meta = tokio::fs::metadata(dest).await.map_err(|e| {
            AppError::Attachment(format!("downloaded file is unreadable: {e}"))
        })?;
        if meta.len() > self.max_bytes {
            return Err(AppError::Attachment(format!(
                "attachment exceeds {} byte limit ({} bytes)",
                self.max_bytes,
                meta.len()
            )));
        }
        tokio::fs::read(dest)
            .await
            .map_err(|e| AppError::Attachment(format!("downloaded file is unreadable: {e}")))
    }
}
