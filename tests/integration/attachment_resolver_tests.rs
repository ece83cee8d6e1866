//! Integration tests for attachment resolution against a fake collaborator.

use std::sync::Arc;

use base64::Engine as _;

use inbox_bridge::attachment::AttachmentResolver;
use inbox_bridge::host::{MessageContent, Priority};
use inbox_bridge::models::event::InboundMessage;

use super::test_helpers::FakeCollaborator;

fn attachment_message(content: &str) -> InboundMessage {
    InboundMessage {
        id: "m1".into(),
        sender_inbox_id: "alice".into(),
        content: content.into(),
        content_type: "remoteStaticAttachment".into(),
        sent_at: "2024-05-01T10:00:00Z".into(),
        sent_at_ns: None,
    }
}

fn dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

/// A downloaded image is inlined and the temporary file removed.
#[tokio::test]
async fn image_is_downloaded_and_inlined() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
    let collaborator = Arc::new(FakeCollaborator {
        download_bytes: Some(bytes.clone()),
        ..FakeCollaborator::default()
    });
    let resolver =
        AttachmentResolver::new(collaborator.clone(), dir.path().to_path_buf(), 1024);

    let message = resolver
        .resolve(&attachment_message(
            "[remote attachment: Holiday Photo.JPG](https://cdn/blob/1)",
        ))
        .await
        .expect("image attachment is handled");

    assert_eq!(message.priority, Priority::Normal);
    assert!(message.trigger_turn);
    assert!(message.text().contains("Holiday Photo.JPG"));
    let MessageContent::Image { data, mime_type } = &message.content[1] else {
        panic!("expected image block");
    };
    assert_eq!(mime_type, "image/jpeg");
    assert_eq!(
        data,
        &base64::engine::general_purpose::STANDARD.encode(&bytes)
    );

    let downloads = collaborator.downloads();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].0, "https://cdn/blob/1");
    let dest = &downloads[0].1;
    assert!(dest.starts_with(dir.path()));
    let name = dest.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-Holiday_Photo.JPG"), "{name}");
    assert!(dir_is_empty(dir.path()), "temporary file removed");
}

/// A failed download degrades to a text notice that keeps the original
/// message's identity.
#[tokio::test]
async fn failed_download_becomes_text_notice() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = AttachmentResolver::new(
        Arc::new(FakeCollaborator::default()),
        dir.path().to_path_buf(),
        1024,
    );

    let message = resolver
        .resolve(&attachment_message("[remote attachment: cat.png](https://cdn/cat)"))
        .await
        .expect("image attachment is handled");

    assert!(message.trigger_turn);
    assert_eq!(message.content.len(), 1);
    assert!(message.text().contains("could not be downloaded"));
    assert!(message.text().contains("cat.png"));
    let meta = message.meta.expect("meta");
    assert_eq!(meta.id, "m1");
    assert_eq!(meta.sender_inbox_id, "alice");
    assert_eq!(meta.content_type, "remoteStaticAttachment");
    assert_eq!(meta.sent_at, "2024-05-01T10:00:00Z");
}

/// Files over the size cap are refused and cleaned up.
#[tokio::test]
async fn oversized_attachment_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = AttachmentResolver::new(
        Arc::new(FakeCollaborator {
            download_bytes: Some(vec![0; 64]),
            ..FakeCollaborator::default()
        }),
        dir.path().to_path_buf(),
        16,
    );

    let message = resolver
        .resolve(&attachment_message("[remote attachment: big.gif](https://cdn/big)"))
        .await
        .expect("image attachment is handled");

    assert_eq!(message.content.len(), 1);
    assert!(message.text().contains("could not be downloaded"));
    assert!(dir_is_empty(dir.path()));
}

/// Non-image attachments and plain text fall through to text handling.
#[tokio::test]
async fn non_images_fall_through() {
    let dir = tempfile::tempdir().unwrap();
    let collaborator = Arc::new(FakeCollaborator {
        download_bytes: Some(vec![1]),
        ..FakeCollaborator::default()
    });
    let resolver =
        AttachmentResolver::new(collaborator.clone(), dir.path().to_path_buf(), 1024);

    assert!(resolver
        .resolve(&attachment_message("[remote attachment: notes.pdf](https://cdn/pdf)"))
        .await
        .is_none());
    assert!(resolver
        .resolve(&attachment_message("just chatting"))
        .await
        .is_none());
    assert!(collaborator.downloads().is_empty());
}
