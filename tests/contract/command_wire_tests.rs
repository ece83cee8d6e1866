//! Contract tests pinning the ndjson command shapes written to the
//! messaging process and the persisted state record.

use std::path::PathBuf;

use inbox_bridge::models::command::{ProtocolCommand, ReactionAction, RemoteAttachment};
use inbox_bridge::models::session::{PersistedState, Watermark};
use serde_json::{json, Value};

fn wire(command: &ProtocolCommand) -> Value {
    serde_json::to_value(command).unwrap()
}

#[test]
fn send_omits_absent_reply() {
    let command = ProtocolCommand::Send { text: "hi".into(), reply_to: None };
    assert_eq!(wire(&command), json!({ "type": "send", "text": "hi" }));
}

#[test]
fn send_reply_uses_camel_case() {
    let command = ProtocolCommand::Send { text: "hi".into(), reply_to: Some("m1".into()) };
    assert_eq!(wire(&command), json!({ "type": "send", "text": "hi", "replyTo": "m1" }));
}

#[test]
fn react_always_carries_action() {
    let command = ProtocolCommand::React {
        message_id: "m1".into(),
        emoji: "👍".into(),
        action: ReactionAction::Remove,
    };
    assert_eq!(
        wire(&command),
        json!({ "type": "react", "messageId": "m1", "emoji": "👍", "action": "remove" })
    );
}

#[test]
fn attach_carries_file_path() {
    let command = ProtocolCommand::Attach {
        file: PathBuf::from("/tmp/report.pdf"),
        mime_type: Some("application/pdf".into()),
        reply_to: None,
    };
    assert_eq!(
        wire(&command),
        json!({ "type": "attach", "file": "/tmp/report.pdf", "mimeType": "application/pdf" })
    );
}

#[test]
fn remote_attach_flattens_descriptor() {
    let command = ProtocolCommand::RemoteAttach(RemoteAttachment {
        url: "https://cdn/x".into(),
        content_digest: "d".into(),
        secret: "s".into(),
        salt: "a".into(),
        nonce: "n".into(),
        content_length: 12,
        filename: None,
        scheme: Some("https://".into()),
    });
    let value = wire(&command);
    assert_eq!(value["type"], "remote-attach");
    assert_eq!(value["contentDigest"], "d");
    assert_eq!(value["contentLength"], 12);
    assert_eq!(value["scheme"], "https://");
    assert!(value.get("filename").is_none());
}

#[test]
fn stop_is_bare_discriminant() {
    assert_eq!(wire(&ProtocolCommand::Stop), json!({ "type": "stop" }));
}

#[test]
fn persisted_record_uses_camel_case_and_string_watermark() {
    let state = PersistedState {
        conversation_id: Some("c1".into()),
        invite_url: None,
        last_seen_watermark: Some(Watermark::from_nanos(1_000)),
    };
    assert_eq!(
        serde_json::to_value(&state).unwrap(),
        json!({ "conversationId": "c1", "lastSeenWatermark": "1000" })
    );
}

#[test]
fn persisted_record_accepts_numeric_watermark() {
    let state: PersistedState =
        serde_json::from_value(json!({ "conversationId": "c1", "lastSeenWatermark": 77 }))
            .unwrap();
    assert_eq!(state.last_seen_watermark, Some(Watermark::from_nanos(77)));
    assert_eq!(state.invite_url, None);
}
