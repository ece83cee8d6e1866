//! Protocol reader task.
//!
//! Reads ndjson lines from the messaging process's stdout, maps each line to
//! a [`ProtocolEvent`], and forwards the events, in line order, to the
//! dispatcher through a bounded [`mpsc`] channel.
//!
//! # Known inbound events
//!
//! | `type`          | Maps to                              |
//! |-----------------|--------------------------------------|
//! | `ready`         | [`ProtocolEvent::Ready`]             |
//! | `message`       | [`ProtocolEvent::Message`]           |
//! | `member_joined` | [`ProtocolEvent::MemberJoined`]      |
//! | `sent`          | [`ProtocolEvent::Sent`]              |
//! | `error`         | [`ProtocolEvent::Error`]             |
//! | *(any other)*   | [`ParseOutcome::Ignored`]            |
//!
//! Lines that are not JSON objects, or that lack a required field, become
//! [`ParseOutcome::Malformed`]. Neither outcome is ever surfaced to the host.

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::event::{InboundMessage, ProtocolEvent, ReadyEvent, SentEvent};
use crate::protocol::codec::{Frame, LineCodec};
use crate::supervisor::SupervisorEvent;

/// Result of mapping one line to the closed event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A recognised, complete event.
    Event(ProtocolEvent),
    /// Valid JSON with an unrecognised discriminant, or a blank line.
    Ignored,
    /// Not JSON, not an object, or a recognised event missing a field.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberJoinedPayload {
    inbox_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Map a single ndjson line to a [`ParseOutcome`].
#[must_use]
pub fn parse_event_line(line: &str) -> ParseOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Ignored;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => return ParseOutcome::Malformed(format!("malformed json: {e}")),
    };

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return ParseOutcome::Malformed("missing `type` discriminant".into());
    };

    let mapped = match kind.as_str() {
        "ready" => payload::<ReadyEvent>(&kind, value).map(ProtocolEvent::Ready),
        "message" => payload::<InboundMessage>(&kind, value).map(ProtocolEvent::Message),
        "member_joined" => payload::<MemberJoinedPayload>(&kind, value)
            .map(|p| ProtocolEvent::MemberJoined { inbox_id: p.inbox_id }),
        "sent" => payload::<SentEvent>(&kind, value).map(ProtocolEvent::Sent),
        "error" => payload::<ErrorPayload>(&kind, value)
            .map(|p| ProtocolEvent::Error { message: p.message }),
        other => {
            debug!(kind = other, "protocol reader: skipping unknown event type");
            return ParseOutcome::Ignored;
        }
    };

    match mapped {
        Ok(event) => ParseOutcome::Event(event),
        Err(reason) => ParseOutcome::Malformed(reason),
    }
}

/// Map a batch of lines, keeping only recognised events in line order.
#[must_use]
pub fn parse_event_lines<'a, I>(lines: I) -> Vec<ProtocolEvent>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter_map(|line| match parse_event_line(line) {
            ParseOutcome::Event(event) => Some(event),
            ParseOutcome::Ignored | ParseOutcome::Malformed(_) => None,
        })
        .collect()
}

/// Reader task: frames `stdout` into lines and forwards recognised events.
///
/// Each event is tagged with `generation` so the dispatcher can discard
/// output from a process it no longer supervises. Malformed, unknown,
/// oversized and non-UTF-8 lines are dropped and reading continues. The
/// task ends at EOF, on a read error, when the
/// dispatcher hangs up, or when `cancel` fires; it never reports the exit
/// itself (the exit monitor does).
pub async fn run_reader<R>(
    generation: u64,
    stdout: R,
    event_tx: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(generation, "protocol reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(generation, "protocol reader: EOF");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "protocol reader: stream error, stopping");
                        break;
                    }
                    Some(Ok(Frame::Oversized)) => {
                        debug!(generation, "protocol reader: dropping oversized line");
                    }
                    Some(Ok(Frame::Invalid(_))) => {
                        debug!(generation, "protocol reader: dropping non-UTF-8 line");
                    }
                    Some(Ok(Frame::Line(line))) => match parse_event_line(&line) {
                        ParseOutcome::Event(event) => {
                            let tagged = SupervisorEvent::Protocol { generation, event };
                            if event_tx.send(tagged).await.is_err() {
                                debug!(generation, "protocol reader: dispatcher gone, stopping");
                                break;
                            }
                        }
                        ParseOutcome::Ignored => {}
                        ParseOutcome::Malformed(reason) => {
                            debug!(generation, reason, "protocol reader: dropping malformed line");
                        }
                    },
                }
            }
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid `{kind}` event: {e}"))
}
