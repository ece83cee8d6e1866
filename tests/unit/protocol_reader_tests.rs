//! Unit tests for ndjson event parsing and command encoding.
//!
//! Covers:
//! - recognised events are produced in exactly the order of their lines
//! - blank, unknown, malformed and incomplete lines never become events
//! - the reader task tags events with the process generation
//! - oversized and non-UTF-8 lines are skipped without ending the stream
//! - commands encode as one compact JSON object per line

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use inbox_bridge::models::command::{ProtocolCommand, ReactionAction, RemoteAttachment};
use inbox_bridge::models::event::ProtocolEvent;
use inbox_bridge::models::session::Watermark;
use inbox_bridge::protocol::codec::MAX_LINE_BYTES;
use inbox_bridge::protocol::reader::{parse_event_line, parse_event_lines, run_reader, ParseOutcome};
use inbox_bridge::protocol::writer::encode_command;
use inbox_bridge::supervisor::SupervisorEvent;

const READY: &str = r#"{"type":"ready","conversationId":"c1","inviteUrl":"https://invite/c1"}"#;
const MESSAGE: &str = r#"{"type":"message","id":"m1","senderInboxId":"alice","content":"hi","contentType":"text","sentAt":"2024-05-01T10:00:00Z","sentAtNs":1714557600000000001}"#;
const JOINED: &str = r#"{"type":"member_joined","inboxId":"bob"}"#;
const SENT: &str = r#"{"type":"sent","id":"s1","sentAtNs":"42"}"#;
const ERROR: &str = r#"{"type":"error","message":"rate limited"}"#;

/// Known events come out in line order with noise dropped in between.
#[test]
fn events_follow_line_order() {
    let lines = [
        READY,
        "",
        "not json at all",
        MESSAGE,
        r#"{"type":"typing","inboxId":"bob"}"#,
        JOINED,
        r#"{"type":"message","id":"m2"}"#,
        SENT,
        r#"["array"]"#,
        ERROR,
    ];

    let kinds: Vec<&str> = parse_event_lines(lines).iter().map(ProtocolEvent::kind).collect();
    assert_eq!(kinds, vec!["ready", "message", "member_joined", "sent", "error"]);
}

/// Each field of a message event is mapped, including a numeric `sentAtNs`.
#[test]
fn message_fields_are_mapped() {
    let ParseOutcome::Event(ProtocolEvent::Message(message)) = parse_event_line(MESSAGE) else {
        panic!("expected message event");
    };
    assert_eq!(message.id, "m1");
    assert_eq!(message.sender_inbox_id, "alice");
    assert_eq!(message.content, "hi");
    assert_eq!(message.content_type, "text");
    assert_eq!(message.watermark(), Some(Watermark::from_nanos(1_714_557_600_000_000_001)));
}

/// Without `sentAtNs`, the RFC 3339 `sentAt` drives the watermark.
#[test]
fn message_watermark_falls_back_to_sent_at() {
    let line = r#"{"type":"message","id":"m1","senderInboxId":"a","content":"x","contentType":"text","sentAt":"1970-01-01T00:00:01Z"}"#;
    let ParseOutcome::Event(ProtocolEvent::Message(message)) = parse_event_line(line) else {
        panic!("expected message event");
    };
    assert_eq!(message.watermark(), Some(Watermark::from_nanos(1_000_000_000)));
}

/// `sent` confirmations carry an optional watermark.
#[test]
fn sent_event_watermark_is_optional() {
    let ParseOutcome::Event(ProtocolEvent::Sent(sent)) = parse_event_line(SENT) else {
        panic!("expected sent event");
    };
    assert_eq!(sent.watermark(), Some(Watermark::from_nanos(42)));

    let ParseOutcome::Event(ProtocolEvent::Sent(bare)) = parse_event_line(r#"{"type":"sent","id":"s2"}"#)
    else {
        panic!("expected sent event");
    };
    assert_eq!(bare.watermark(), None);
}

/// Blank and unknown lines are ignored; broken lines are malformed.
#[test]
fn non_events_are_classified() {
    assert_eq!(parse_event_line("   "), ParseOutcome::Ignored);
    assert_eq!(parse_event_line(r#"{"type":"presence"}"#), ParseOutcome::Ignored);
    assert!(matches!(parse_event_line("{oops"), ParseOutcome::Malformed(_)));
    assert!(matches!(parse_event_line(r#"{"id":"x"}"#), ParseOutcome::Malformed(_)));
    assert!(matches!(
        parse_event_line(r#"{"type":"ready"}"#),
        ParseOutcome::Malformed(_)
    ));
}

/// The reader task forwards events tagged with its generation and stops at EOF.
#[tokio::test]
async fn reader_tags_events_with_generation() {
    let (mut writer, reader) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::channel(16);
    let task = tokio::spawn(run_reader(7, reader, tx, CancellationToken::new()));

    writer
        .write_all(format!("{READY}\ngarbage\n{JOINED}\n").as_bytes())
        .await
        .unwrap();
    drop(writer);
    task.await.unwrap();

    let mut generations = Vec::new();
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            SupervisorEvent::Protocol { generation, event } => {
                generations.push(generation);
                kinds.push(event.kind());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(generations, vec![7, 7]);
    assert_eq!(kinds, vec!["ready", "member_joined"]);
}

async fn sent_ids_from(stream: Vec<u8>) -> Vec<String> {
    let (tx, mut rx) = mpsc::channel(8);
    run_reader(1, std::io::Cursor::new(stream), tx, CancellationToken::new()).await;

    let mut ids = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SupervisorEvent::Protocol { event: ProtocolEvent::Sent(sent), .. } = event {
            ids.push(sent.id);
        }
    }
    ids
}

/// A non-UTF-8 line is dropped without ending the stream.
#[tokio::test]
async fn reader_survives_invalid_utf8_line() {
    let mut stream = b"{\"type\":\"sent\",\"id\":\"a\"}\n".to_vec();
    stream.extend_from_slice(b"\xff\xfe garbage\n");
    stream.extend_from_slice(b"{\"type\":\"sent\",\"id\":\"b\"}\n");

    assert_eq!(sent_ids_from(stream).await, vec!["a", "b"]);
}

/// A line over the length cap is dropped without ending the stream.
#[tokio::test]
async fn reader_survives_oversized_line() {
    let mut stream = b"{\"type\":\"sent\",\"id\":\"a\"}\n".to_vec();
    stream.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 10));
    stream.push(b'\n');
    stream.extend_from_slice(b"{\"type\":\"sent\",\"id\":\"b\"}\n");

    assert_eq!(sent_ids_from(stream).await, vec!["a", "b"]);
}

/// Commands use the `type` discriminant and camelCase fields.
#[test]
fn commands_encode_as_single_lines() {
    let react = encode_command(&ProtocolCommand::React {
        message_id: "m1".into(),
        emoji: "🎉".into(),
        action: ReactionAction::Remove,
    })
    .unwrap();
    let text = String::from_utf8(react).unwrap();
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1);
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["type"], "react");
    assert_eq!(value["messageId"], "m1");
    assert_eq!(value["action"], "remove");

    let attach = encode_command(&ProtocolCommand::Attach {
        file: PathBuf::from("/tmp/report.pdf"),
        mime_type: None,
        reply_to: Some("m9".into()),
    })
    .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&attach).unwrap();
    assert_eq!(value["type"], "attach");
    assert_eq!(value["file"], "/tmp/report.pdf");
    assert_eq!(value["replyTo"], "m9");
    assert!(value.get("mimeType").is_none());

    let remote = encode_command(&ProtocolCommand::RemoteAttach(RemoteAttachment {
        url: "https://cdn/blob".into(),
        content_digest: "d".into(),
        secret: "s".into(),
        salt: "a".into(),
        nonce: "n".into(),
        content_length: 12,
        filename: Some("x.png".into()),
        scheme: None,
    }))
    .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&remote).unwrap();
    assert_eq!(value["type"], "remote-attach");
    assert_eq!(value["contentDigest"], "d");
    assert_eq!(value["contentLength"], 12);
    assert_eq!(value["filename"], "x.png");
}
