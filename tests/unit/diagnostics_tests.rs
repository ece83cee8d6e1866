//! Unit tests for the bounded stderr diagnostic buffer.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use inbox_bridge::supervisor::diagnostics::{
    run_diagnostics_reader, DiagnosticBuffer, DIAGNOSTIC_CAPACITY,
};
use inbox_bridge::supervisor::SupervisorEvent;

/// The buffer never exceeds its capacity and keeps the newest lines.
#[test]
fn buffer_keeps_most_recent_lines() {
    let mut buffer = DiagnosticBuffer::new();
    for i in 1..=DIAGNOSTIC_CAPACITY + 10 {
        buffer.push(format!("line {i}"));
        assert!(buffer.len() <= DIAGNOSTIC_CAPACITY);
    }

    let tail = buffer.tail();
    assert_eq!(tail.len(), DIAGNOSTIC_CAPACITY);
    assert_eq!(tail.first().map(String::as_str), Some("line 11"));
    assert_eq!(
        tail.last().map(String::as_str),
        Some(format!("line {}", DIAGNOSTIC_CAPACITY + 10).as_str())
    );
}

/// A short run is returned whole, oldest first.
#[test]
fn short_run_is_kept_in_order() {
    let mut buffer = DiagnosticBuffer::with_capacity(3);
    assert!(buffer.is_empty());
    buffer.push("a");
    buffer.push("b");
    assert_eq!(buffer.tail(), vec!["a", "b"]);
    buffer.push("c");
    buffer.push("d");
    assert_eq!(buffer.tail(), vec!["b", "c", "d"]);
}

/// The stderr reader forwards every line tagged with its generation.
#[tokio::test]
async fn stderr_reader_forwards_lines() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let (tx, mut rx) = mpsc::channel(8);
    let task = tokio::spawn(run_diagnostics_reader(3, reader, tx, CancellationToken::new()));

    writer.write_all(b"warming up\nfailed: no key\n").await.unwrap();
    drop(writer);
    task.await.unwrap();

    let mut lines = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SupervisorEvent::Diagnostic { generation, line } = event {
            assert_eq!(generation, 3);
            lines.push(line);
        }
    }
    assert_eq!(lines, vec!["warming up", "failed: no key"]);
}

/// A non-UTF-8 stderr line is kept in lossy form and later lines still arrive.
#[tokio::test]
async fn stderr_reader_keeps_going_after_invalid_utf8() {
    let stream = b"first\n\xff bad\nthird\nfourth\n".to_vec();
    let (tx, mut rx) = mpsc::channel(8);
    run_diagnostics_reader(1, std::io::Cursor::new(stream), tx, CancellationToken::new()).await;

    let mut lines = Vec::new();
    while let Ok(SupervisorEvent::Diagnostic { line, .. }) = rx.try_recv() {
        lines.push(line);
    }
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "first");
    assert!(lines[1].ends_with(" bad"));
    assert_eq!(&lines[2..], ["third", "fourth"]);
}
