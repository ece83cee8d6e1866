//! Unit tests for the session model and watermark arithmetic.

use inbox_bridge::models::session::{PersistedState, Session, Watermark};

/// The watermark never moves backwards, whatever order candidates arrive in.
#[test]
fn watermark_is_monotonic() {
    let mut session = Session::default();
    let mut highest = 0;
    for candidate in [5_u64, 3, 9, 9, 1, 12, 11] {
        session.advance_watermark(Watermark::from_nanos(candidate));
        highest = highest.max(candidate);
        assert_eq!(session.watermark(), Some(Watermark::from_nanos(highest)));
    }
}

/// Advancing reports whether anything changed.
#[test]
fn advance_reports_change() {
    let mut session = Session::default();
    assert!(session.advance_watermark(Watermark::from_nanos(10)));
    assert!(!session.advance_watermark(Watermark::from_nanos(10)));
    assert!(!session.advance_watermark(Watermark::from_nanos(4)));
    assert!(session.advance_watermark(Watermark::from_nanos(11)));
}

/// Re-attaching to the same conversation keeps the watermark.
#[test]
fn resuming_keeps_watermark() {
    let mut session = Session::default();
    assert!(!session.attach("c1", Some("https://invite/1".into()), None));
    session.advance_watermark(Watermark::from_nanos(50));

    assert!(session.attach("c1", None, Some("/tmp/qr.png".into())));
    assert_eq!(session.watermark(), Some(Watermark::from_nanos(50)));
    assert_eq!(session.invite_url.as_deref(), Some("https://invite/1"));
    assert_eq!(session.qr_code_path.as_deref(), Some("/tmp/qr.png"));
}

/// Moving to another conversation drops state that belonged to the old one.
#[test]
fn switching_conversation_resets_state() {
    let mut session = Session::default();
    session.attach("c1", Some("https://invite/1".into()), None);
    session.advance_watermark(Watermark::from_nanos(50));

    assert!(!session.attach("c2", None, None));
    assert_eq!(session.conversation_id.as_deref(), Some("c2"));
    assert_eq!(session.invite_url, None);
    assert_eq!(session.watermark(), None);
}

/// Millisecond epochs and RFC 3339 strings both convert to nanoseconds.
#[test]
fn sent_at_formats_convert() {
    assert_eq!(
        Watermark::from_sent_at("1714557600000"),
        Some(Watermark::from_nanos(1_714_557_600_000_000_000))
    );
    assert_eq!(
        Watermark::from_sent_at("2024-05-01T10:00:00.5+00:00"),
        Some(Watermark::from_nanos(1_714_557_600_500_000_000))
    );
    assert_eq!(Watermark::from_sent_at("yesterday"), None);
}

/// The persisted record omits absent optional fields.
#[test]
fn persisted_state_omits_absent_fields() {
    let mut session = Session::default();
    session.attach("c1", None, Some("/tmp/qr.png".into()));
    let value = serde_json::to_value(session.to_persisted()).unwrap();
    assert_eq!(value, serde_json::json!({ "conversationId": "c1" }));

    let restored: PersistedState =
        serde_json::from_str(r#"{"conversationId":"c1","lastSeenWatermark":"77"}"#).unwrap();
    assert_eq!(
        Session::from(restored).watermark(),
        Some(Watermark::from_nanos(77))
    );
}
