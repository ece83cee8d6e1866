//! Typed events produced by the messaging process.
//!
//! Five variants arrive on the wire (`ready`, `message`, `member_joined`,
//! `sent`, `error`); [`ProtocolEvent::Exit`] is synthesised by the
//! supervisor when the child process terminates.

use serde::{Deserialize, Serialize};

use crate::models::session::Watermark;

/// Conversation context established by the messaging process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyEvent {
    /// Opaque conversation identifier.
    pub conversation_id: String,
    /// Invite link for new participants.
    #[serde(default)]
    pub invite_url: Option<String>,
    /// Rendered QR code image for the invite link.
    #[serde(default)]
    pub qr_code_path: Option<String>,
}

/// A message received in the conversation.
///
/// The same shape is returned by the history query used for catch-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Message identifier.
    pub id: String,
    /// Inbox identifier of the author.
    pub sender_inbox_id: String,
    /// Textual content (or the CLI's textual description of non-text content).
    pub content: String,
    /// Content type label, e.g. `text` or `remoteStaticAttachment`.
    pub content_type: String,
    /// Human-readable send time.
    #[serde(deserialize_with = "super::string_or_number")]
    pub sent_at: String,
    /// Exact send time in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at_ns: Option<Watermark>,
}

impl InboundMessage {
    /// Send-time as a watermark, preferring the exact nanosecond field.
    #[must_use]
    pub fn watermark(&self) -> Option<Watermark> {
        self.sent_at_ns
            .or_else(|| Watermark::from_sent_at(&self.sent_at))
    }
}

/// Delivery confirmation for a previously issued command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEvent {
    /// Identifier of the delivered message.
    pub id: String,
    /// Human-readable send time, when reported.
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub sent_at: Option<String>,
    /// Exact send time in nanoseconds, when reported.
    #[serde(default)]
    pub sent_at_ns: Option<Watermark>,
}

impl SentEvent {
    /// Send-time as a watermark, if the confirmation carried one.
    #[must_use]
    pub fn watermark(&self) -> Option<Watermark> {
        self.sent_at_ns
            .or_else(|| self.sent_at.as_deref().and_then(Watermark::from_sent_at))
    }
}

/// Terminal state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitEvent {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Whether the grace timer had to kill the process.
    pub forced: bool,
    /// Whether readiness was reached before the exit.
    pub was_ready: bool,
}

/// Closed set of events the dispatcher reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The process joined or created its conversation.
    Ready(ReadyEvent),
    /// A conversation message arrived.
    Message(InboundMessage),
    /// A participant joined the conversation.
    MemberJoined {
        /// Inbox identifier of the new member.
        inbox_id: String,
    },
    /// A command was delivered.
    Sent(SentEvent),
    /// The process reported a non-fatal error.
    Error {
        /// Error description.
        message: String,
    },
    /// The process exited.
    Exit(ExitEvent),
}

impl ProtocolEvent {
    /// Wire discriminant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready(_) => "ready",
            Self::Message(_) => "message",
            Self::MemberJoined { .. } => "member_joined",
            Self::Sent(_) => "sent",
            Self::Error { .. } => "error",
            Self::Exit(_) => "exit",
        }
    }
}

fn optional_string_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    super::string_or_number(deserializer).map(Some)
}
