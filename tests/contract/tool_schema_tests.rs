//! Contract tests for the tool catalogue registered with the host.

use inbox_bridge::mode::{ModeRouter, RouteMode};
use inbox_bridge::tools::{
    catalogue, offered, ATTACH_TOOL, REACT_TOOL, REMOTE_ATTACH_TOOL, SEND_TOOL, STATUS_TOOL,
};
use serde_json::Value;

fn required(name: &str) -> Vec<String> {
    let tool = catalogue().into_iter().find(|t| t.name == name).unwrap();
    tool.input_schema["required"]
        .as_array()
        .map(|fields| fields.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

#[test]
fn catalogue_lists_every_action() {
    let names: Vec<_> = catalogue().iter().map(|t| t.name).collect();
    assert_eq!(names, vec![SEND_TOOL, REACT_TOOL, ATTACH_TOOL, REMOTE_ATTACH_TOOL, STATUS_TOOL]);
}

#[test]
fn required_fields_match_command_contract() {
    assert_eq!(required(SEND_TOOL), ["text"]);
    assert_eq!(required(REACT_TOOL), ["message_id", "emoji"]);
    assert_eq!(required(ATTACH_TOOL), ["file"]);
    assert_eq!(
        required(REMOTE_ATTACH_TOOL),
        ["url", "content_digest", "secret", "salt", "nonce", "content_length"]
    );
    assert!(required(STATUS_TOOL).is_empty());
}

#[test]
fn react_action_enum_values() {
    let react = catalogue().into_iter().find(|t| t.name == REACT_TOOL).unwrap();
    let values = &react.input_schema["properties"]["action"]["enum"];
    assert_eq!(values, &serde_json::json!(["add", "remove"]));
}

#[test]
fn serialised_definition_hides_routing_flag() {
    let value = serde_json::to_value(&catalogue()[0]).unwrap();
    assert!(value.get("inputSchema").is_some());
    assert!(value.get("remote").is_none());
}

#[test]
fn offered_tools_follow_route_mode() {
    let router = ModeRouter::new();
    let local = router.prepare_turn("");
    assert_eq!(local.mode, RouteMode::Local);
    let names: Vec<_> = offered(&local).iter().map(|t| t.name).collect();
    assert_eq!(names, vec![STATUS_TOOL]);

    router.mark_remote();
    assert_eq!(offered(&router.prepare_turn("")).len(), catalogue().len());
}
