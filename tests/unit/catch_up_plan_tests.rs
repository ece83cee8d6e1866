//! Unit tests for catch-up planning (filtering and watermark selection).

use inbox_bridge::host::{MessageContent, Priority};
use inbox_bridge::models::event::InboundMessage;
use inbox_bridge::models::session::Watermark;
use inbox_bridge::orchestrator::catch_up::{plan, REVIEW_INSTRUCTION};

fn message(id: &str, sender: &str, content: &str, ns: u64) -> InboundMessage {
    InboundMessage {
        id: id.into(),
        sender_inbox_id: sender.into(),
        content: content.into(),
        content_type: "text".into(),
        sent_at: format!("2024-05-01T10:00:0{}Z", ns % 10),
        sent_at_ns: Some(Watermark::from_nanos(ns)),
    }
}

/// Self-authored messages are left out of the summary but still advance
/// the watermark to the newest fetched message.
#[test]
fn self_messages_filtered_but_counted() {
    let fetched = vec![
        message("t1", "alice", "first", 100),
        message("t2", "me", "my own reply", 200),
        message("t3", "bob", "third", 300),
    ];

    let plan = plan(&fetched, Some("me"));

    assert_eq!(plan.fetched, 3);
    assert_eq!(plan.delivered, 2);
    assert_eq!(plan.max_watermark, Some(Watermark::from_nanos(300)));

    let summary = plan.summary.expect("summary");
    assert_eq!(summary.priority, Priority::Steer);
    assert!(summary.trigger_turn);
    let text = summary.text();
    assert!(text.contains("[alice at"));
    assert!(text.contains("first"));
    assert!(text.contains("[bob at"));
    assert!(text.contains("third"));
    assert!(!text.contains("my own reply"));
    assert!(text.ends_with(REVIEW_INSTRUCTION));
}

/// The newest self-authored message still wins the watermark.
#[test]
fn newest_self_message_sets_watermark() {
    let fetched = vec![
        message("t1", "alice", "first", 100),
        message("t2", "me", "latest", 900),
    ];
    let plan = plan(&fetched, Some("me"));
    assert_eq!(plan.max_watermark, Some(Watermark::from_nanos(900)));
    assert_eq!(plan.delivered, 1);
}

/// Without a known identity nothing is filtered.
#[test]
fn unknown_identity_keeps_everything() {
    let fetched = vec![
        message("t1", "alice", "first", 100),
        message("t2", "me", "mine", 200),
    ];
    let plan = plan(&fetched, None);
    assert_eq!(plan.delivered, 2);
    assert!(plan.summary.expect("summary").text().contains("mine"));
}

/// Summary lines follow the fetched order and form one text block.
#[test]
fn summary_preserves_order_in_one_block() {
    let fetched = vec![
        message("t1", "alice", "one", 1),
        message("t2", "bob", "two", 2),
        message("t3", "carol", "three", 3),
    ];
    let summary = plan(&fetched, Some("me")).summary.expect("summary");
    assert_eq!(summary.content.len(), 1);
    assert!(matches!(summary.content[0], MessageContent::Text { .. }));

    let text = summary.text();
    let one = text.find("one").unwrap();
    let two = text.find("two").unwrap();
    let three = text.find("three").unwrap();
    assert!(one < two && two < three);
    assert!(text.starts_with("While you were away, 3 new messages"));
}
