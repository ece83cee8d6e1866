//! Boundary to the host agent runtime.
//!
//! The controller only ever does two things to the host: publish a message
//! onto its bus (optionally triggering a reasoning turn) and emit a notice
//! for the operator. [`HostBus`] captures both; [`ChannelHost`] forwards
//! them into an `mpsc` channel for the headless binary and for tests.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::event::InboundMessage;

/// Scheduling priority of a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Injected mid-session ahead of ordinary input.
    Steer,
    /// Queued behind whatever the host is doing.
    Normal,
}

/// One block of published content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    Image {
        /// Base64-encoded bytes.
        data: String,
        /// MIME type, e.g. `image/png`.
        mime_type: String,
    },
}

impl MessageContent {
    /// Text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Identifying fields of the conversation message a publish came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMeta {
    /// Message identifier.
    pub id: String,
    /// Author's inbox identifier.
    pub sender_inbox_id: String,
    /// Content type label.
    pub content_type: String,
    /// Human-readable send time.
    pub sent_at: String,
}

impl From<&InboundMessage> for InboundMeta {
    fn from(message: &InboundMessage) -> Self {
        Self {
            id: message.id.clone(),
            sender_inbox_id: message.sender_inbox_id.clone(),
            content_type: message.content_type.clone(),
            sent_at: message.sent_at.clone(),
        }
    }
}

/// A message for the host bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMessage {
    /// Scheduling priority.
    pub priority: Priority,
    /// Whether the host should start a reasoning turn for it.
    pub trigger_turn: bool,
    /// Content blocks, in display order.
    pub content: Vec<MessageContent>,
    /// Originating conversation message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<InboundMeta>,
}

impl HostMessage {
    /// Turn-triggering text message for a live conversation message.
    #[must_use]
    pub fn remote_text(message: &InboundMessage) -> Self {
        Self {
            priority: Priority::Normal,
            trigger_turn: true,
            content: vec![MessageContent::text(format!(
                "[{}] {}",
                message.sender_inbox_id, message.content
            ))],
            meta: Some(InboundMeta::from(message)),
        }
    }

    /// Concatenated text blocks, for logging and assertions.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                MessageContent::Text { text } => Some(text.as_str()),
                MessageContent::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Operator-facing notices about the bridge itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum BridgeNotice {
    /// The process joined its conversation.
    Ready {
        /// Conversation identifier.
        conversation_id: String,
        /// Invite link, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        invite_url: Option<String>,
        /// QR code image path, when rendered.
        #[serde(skip_serializing_if = "Option::is_none")]
        qr_code_path: Option<String>,
        /// Whether a persisted conversation was resumed.
        resumed: bool,
    },
    /// A participant joined.
    MemberJoined {
        /// Inbox identifier of the new member.
        inbox_id: String,
    },
    /// A command was delivered.
    Delivered {
        /// Identifier of the delivered message.
        id: String,
    },
    /// The process reported a non-fatal error.
    ProtocolError {
        /// Error description.
        message: String,
    },
    /// The process exited before becoming ready.
    StartupFailure {
        /// Exit code; `None` when terminated by a signal.
        code: Option<i32>,
        /// Last stderr lines, oldest first.
        diagnostics: Vec<String>,
    },
    /// The process exited after becoming ready (or cleanly before).
    ProcessExited {
        /// Exit code; `None` when terminated by a signal.
        code: Option<i32>,
        /// Whether the stop grace period expired and the process was killed.
        forced: bool,
    },
    /// The messaging CLI cannot be invoked; nothing was started.
    CollaboratorUnavailable {
        /// Reason reported by the availability probe.
        reason: String,
    },
}

/// Host runtime primitives used by the controller.
///
/// Implementations must not block: they are called from the dispatcher.
pub trait HostBus: Send + Sync {
    /// Publish a message onto the host bus.
    fn publish(&self, message: HostMessage);

    /// Surface a notice to the operator.
    fn notify(&self, notice: BridgeNotice);
}

/// Everything the controller hands to a [`ChannelHost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum HostOutput {
    /// A [`HostBus::publish`] call.
    Message(HostMessage),
    /// A [`HostBus::notify`] call.
    Notice(BridgeNotice),
}

/// [`HostBus`] that forwards into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHost {
    tx: mpsc::UnboundedSender<HostOutput>,
}

impl ChannelHost {
    /// Create the host and the receiver that observes it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, output: HostOutput) {
        if self.tx.send(output).is_err() {
            debug!("host output receiver dropped");
        }
    }
}

impl HostBus for ChannelHost {
    fn publish(&self, message: HostMessage) {
        self.forward(HostOutput::Message(message));
    }

    fn notify(&self, notice: BridgeNotice) {
        self.forward(HostOutput::Notice(notice));
    }
}
