//! Unit tests for the remote/local mode router and turn directives.

use std::sync::Arc;

use inbox_bridge::mode::{directive_for, ModeRouter, RouteMode};
use inbox_bridge::tools::{self, SEND_TOOL, STATUS_TOOL};

/// The directive is recomputed from the latest trigger on every turn.
#[test]
fn directive_tracks_latest_trigger() {
    let router = ModeRouter::new();

    router.mark_remote();
    assert_eq!(router.prepare_turn("base").mode, RouteMode::Remote);
    assert_eq!(router.prepare_turn("base").mode, RouteMode::Remote);

    router.mark_local();
    let turn = router.prepare_turn("base");
    assert_eq!(turn.mode, RouteMode::Local);
    assert!(turn.instructions.ends_with(&directive_for(RouteMode::Local)));
}

/// The remote directive names the reply tool and forbids formatting.
#[test]
fn remote_directive_names_reply_tool() {
    let text = directive_for(RouteMode::Remote);
    assert!(text.contains(SEND_TOOL));
    assert!(text.contains("plain text"));

    let local = directive_for(RouteMode::Local);
    assert!(local.contains("do not call"));
}

/// Tool availability follows the directive.
#[test]
fn offered_tools_follow_mode() {
    let router = ModeRouter::new();
    let local: Vec<&str> = tools::offered(&router.prepare_turn(""))
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(local, vec![STATUS_TOOL]);

    router.mark_remote();
    let remote: Vec<&str> = tools::offered(&router.prepare_turn(""))
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(remote.contains(&SEND_TOOL));
    assert!(remote.contains(&STATUS_TOOL));
}

/// The router is shared across threads without losing the latest write.
#[test]
fn router_is_shared_across_threads() {
    let router = Arc::new(ModeRouter::new());
    let remote = Arc::clone(&router);
    std::thread::spawn(move || remote.mark_remote())
        .join()
        .unwrap();
    assert!(router.is_remote());
}
