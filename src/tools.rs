//! Remote-callable actions exposed to the host agent.
//!
//! [`catalogue`] describes each action with a JSON schema for the host to
//! register; [`invoke`] validates the arguments and runs the action through
//! a [`BridgeHandle`]. The conversation actions are only offered while the
//! latest turn trigger is remote (see [`offered`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

use crate::bridge::BridgeHandle;
use crate::mode::TurnDirective;
use crate::models::command::{ReactionAction, RemoteAttachment};
use crate::{AppError, Result};

/// Reply in the conversation.
pub const SEND_TOOL: &str = "inbox_send";
/// React to a conversation message.
pub const REACT_TOOL: &str = "inbox_react";
/// Send a local file into the conversation.
pub const ATTACH_TOOL: &str = "inbox_attach";
/// Send an already-uploaded encrypted attachment.
pub const REMOTE_ATTACH_TOOL: &str = "inbox_remote_attach";
/// Report bridge status.
pub const STATUS_TOOL: &str = "bridge_status";

/// Registration record for one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Action name.
    pub name: &'static str,
    /// Description shown to the agent.
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
    /// Whether the action talks to the remote conversation.
    #[serde(skip)]
    pub remote: bool,
}

/// Every action the bridge provides.
#[must_use]
pub fn catalogue() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SEND_TOOL,
            description: "Send a plain-text message to the remote conversation, optionally \
                          replying to a specific message.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "reply_to": { "type": "string" }
                },
                "required": ["text"]
            }),
            remote: true,
        },
        ToolDefinition {
            name: REACT_TOOL,
            description: "Add or remove an emoji reaction on a conversation message.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message_id": { "type": "string" },
                    "emoji": { "type": "string" },
                    "action": { "type": "string", "enum": ["add", "remove"], "default": "add" }
                },
                "required": ["message_id", "emoji"]
            }),
            remote: true,
        },
        ToolDefinition {
            name: ATTACH_TOOL,
            description: "Send a file from the local workspace into the conversation.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "mime_type": { "type": "string" },
                    "reply_to": { "type": "string" }
                },
                "required": ["file"]
            }),
            remote: true,
        },
        ToolDefinition {
            name: REMOTE_ATTACH_TOOL,
            description: "Send an attachment that has already been encrypted and uploaded.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "content_digest": { "type": "string" },
                    "secret": { "type": "string" },
                    "salt": { "type": "string" },
                    "nonce": { "type": "string" },
                    "content_length": { "type": "integer", "minimum": 0 },
                    "filename": { "type": "string" },
                    "scheme": { "type": "string" }
                },
                "required": ["url", "content_digest", "secret", "salt", "nonce", "content_length"]
            }),
            remote: true,
        },
        ToolDefinition {
            name: STATUS_TOOL,
            description: "Report the messaging process state, conversation and invite link.",
            input_schema: json!({ "type": "object", "properties": {} }),
            remote: false,
        },
    ]
}

/// Actions to offer for a turn prepared with `directive`.
#[must_use]
pub fn offered(directive: &TurnDirective) -> Vec<ToolDefinition> {
    catalogue()
        .into_iter()
        .filter(|tool| directive.remote_tools_enabled || !tool.remote)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SendInput {
    text: String,
    #[serde(default)]
    reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReactInput {
    message_id: String,
    emoji: String,
    #[serde(default)]
    action: ReactionAction,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AttachInput {
    file: PathBuf,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteAttachInput {
    url: String,
    content_digest: String,
    secret: String,
    salt: String,
    nonce: String,
    content_length: u64,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    scheme: Option<String>,
}

fn parse_input<T: for<'de> Deserialize<'de>>(name: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|err| AppError::Protocol(format!("invalid {name} parameters: {err}")))
}

fn delivery(accepted: bool) -> Value {
    json!({ "queued": accepted })
}

/// Run action `name` with `args`.
///
/// # Errors
///
/// - [`AppError::Protocol`] for an unknown action or invalid arguments.
/// - [`AppError::NotReady`] when the conversation is not ready yet.
/// - [`AppError::Closed`] after shutdown.
pub async fn invoke(handle: &BridgeHandle, name: &str, args: Value) -> Result<Value> {
    let span = info_span!("tool_call", tool = %name);

    async move {
        let result = match name {
            SEND_TOOL => {
                let input: SendInput = parse_input(name, args)?;
                delivery(handle.send_text(input.text, input.reply_to).await?)
            }
            REACT_TOOL => {
                let input: ReactInput = parse_input(name, args)?;
                delivery(
                    handle
                        .react(input.message_id, input.emoji, input.action)
                        .await?,
                )
            }
            ATTACH_TOOL => {
                let input: AttachInput = parse_input(name, args)?;
                delivery(
                    handle
                        .attach(input.file, input.mime_type, input.reply_to)
                        .await?,
                )
            }
            REMOTE_ATTACH_TOOL => {
                let input: RemoteAttachInput = parse_input(name, args)?;
                delivery(
                    handle
                        .remote_attach(RemoteAttachment {
                            url: input.url,
                            content_digest: input.content_digest,
                            secret: input.secret,
                            salt: input.salt,
                            nonce: input.nonce,
                            content_length: input.content_length,
                            filename: input.filename,
                            scheme: input.scheme,
                        })
                        .await?,
                )
            }
            STATUS_TOOL => {
                let status = handle.status().await?;
                serde_json::to_value(status)
                    .map_err(|err| AppError::Protocol(format!("failed to encode status: {err}")))?
            }
            other => return Err(AppError::Protocol(format!("unknown tool: {other}"))),
        };
        info!("tool call completed");
        Ok(result)
    }
    .instrument(span)
    .await
}
