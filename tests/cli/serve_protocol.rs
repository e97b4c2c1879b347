//! The JSON line protocol over the binary's stdin and stdout

use crate::common::{response_for, PluginDir};
use serde_json::{json, Value};

#[test]
fn test_serve_answers_each_request() {
    let dir = PluginDir::new();
    dir.echo_plugin("echo", true);
    dir.echo_plugin("idle", false);

    let output = dir.serve(&[
        r#"{"id": 1, "op": "list"}"#,
        r#"{"id": 2, "op": "invoke", "pluginId": "echo", "method": "echo", "args": ["hi", 2]}"#,
        r#"{"id": 3, "op": "invoke", "pluginId": "idle", "method": "ping"}"#,
        r#"{"id": 4, "op": "rendererLocation", "pluginId": "idle"}"#,
        r#"{"id": 5, "op": "launch"}"#,
        "this is not json",
        r#"{"id": 6, "op": "invoke", "pluginId": "echo", "method": "fail"}"#,
    ]);

    let responses: Vec<&Value> = output.iter().filter(|line| line.get("channel").is_none()).collect();
    assert_eq!(responses.len(), 7, "unexpected output {output:?}");

    let listed: Vec<_> = response_for(&output, 1)["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].clone())
        .collect();
    assert_eq!(listed, vec![json!("echo"), json!("idle")]);

    assert_eq!(
        response_for(&output, 2)["result"],
        json!({"success": true, "result": ["hi", 2]})
    );
    assert_eq!(
        response_for(&output, 3)["result"],
        json!({"success": false, "error": "Plugin idle not active or has no exposed methods"})
    );
    assert_eq!(
        response_for(&output, 4)["result"],
        "/plugins/idle/dist/renderer.js"
    );
    assert!(response_for(&output, 5)["error"].is_string());
    assert!(output
        .iter()
        .any(|line| line["id"].is_null() && line["error"].is_string()));
    assert_eq!(
        response_for(&output, 6)["result"],
        json!({"success": false, "error": "boom"})
    );
}

#[test]
fn test_serve_forwards_subscribed_events() {
    let dir = PluginDir::new();
    dir.echo_plugin("late", false);

    let output = dir.serve(&[
        r#"{"id": 1, "op": "subscribe", "pluginId": "late", "event": "ready"}"#,
        r#"{"id": 2, "op": "activate", "pluginId": "late"}"#,
    ]);

    assert_eq!(response_for(&output, 1)["result"], true);
    assert_eq!(response_for(&output, 2)["result"]["isActive"], true);
    let event = output
        .iter()
        .find(|line| line.get("channel").is_some())
        .expect("ready event forwarded");
    assert_eq!(
        event,
        &json!({"channel": "plugin:event:late:ready", "payload": {"n": 1}})
    );
}

#[test]
fn test_serve_with_no_input_exits_cleanly() {
    let dir = PluginDir::new();
    assert!(dir.serve(&[]).is_empty());
}
