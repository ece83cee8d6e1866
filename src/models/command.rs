//! Commands written to the messaging process.
//!
//! Commands are only ever constructed by the bridge in response to tool
//! invocations; they are serialised, never parsed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether a reaction is added or withdrawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    /// Add the reaction (default).
    #[default]
    Add,
    /// Remove a previously added reaction.
    Remove,
}

/// Encrypted remote attachment descriptor, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttachment {
    /// Where the encrypted payload is hosted.
    pub url: String,
    /// Digest of the encrypted payload.
    pub content_digest: String,
    /// Encryption secret.
    pub secret: String,
    /// Key-derivation salt.
    pub salt: String,
    /// Cipher nonce.
    pub nonce: String,
    /// Size of the encrypted payload in bytes.
    pub content_length: u64,
    /// Display filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// URL scheme hint, e.g. `https://`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// Closed set of commands understood by the messaging process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProtocolCommand {
    /// Send a text message.
    #[serde(rename_all = "camelCase")]
    Send {
        /// Message body.
        text: String,
        /// Message being replied to.
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    /// React to a message.
    #[serde(rename_all = "camelCase")]
    React {
        /// Target message.
        message_id: String,
        /// Reaction emoji.
        emoji: String,
        /// Add or remove.
        action: ReactionAction,
    },
    /// Upload and send a local file.
    #[serde(rename_all = "camelCase")]
    Attach {
        /// Local file to send.
        file: PathBuf,
        /// MIME type override.
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Message being replied to.
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    /// Send an already-uploaded encrypted attachment.
    RemoteAttach(RemoteAttachment),
    /// Ask the process to exit.
    Stop,
}

impl ProtocolCommand {
    /// Wire discriminant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::React { .. } => "react",
            Self::Attach { .. } => "attach",
            Self::RemoteAttach(_) => "remote-attach",
            Self::Stop => "stop",
        }
    }
}
