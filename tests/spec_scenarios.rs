//! Concrete scenarios from §8.

mod common;

use common::{add_tool, echoed_message_tool, screenshot_tool};
use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::json;
use toolmode_sandbox::Sandbox;

/// Scenario 1: `add({a,b}) -> a+b`.
#[tokio::test]
async fn scenario_1_add() {
    let mut sandbox = Sandbox::new(vec![add_tool()]).expect("sandbox");
    let result = sandbox
        .execute("return await tool('add', { a: 2, b: 3 });")
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.result.unwrap(), json!(5));
    assert!(result.blobs.is_empty());
}

/// Scenario 2: two tools combined into one object result.
#[tokio::test]
async fn scenario_2_add_and_echo_combined() {
    let mut sandbox =
        Sandbox::new(vec![add_tool(), echoed_message_tool()]).expect("sandbox");
    let result = sandbox
        .execute(
            "const sum = await tool('add', { a: 10, b: 20 });\n\
             const echo = await tool('echo', { message: 'hello' });\n\
             return { sum, echo };",
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(
        result.result.unwrap(),
        json!({"sum": 30, "echo": {"echoed": "hello"}})
    );
}

/// Scenario 3: store persistence across two executions.
#[tokio::test]
async fn scenario_3_store_persistence() {
    let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
    let first = sandbox.execute("store.counter = 123;").await;
    assert!(first.success);

    let second = sandbox
        .execute("store.counter += 42; return store.counter;")
        .await;
    assert!(second.success, "error: {:?}", second.error);
    assert_eq!(second.result.unwrap(), json!(165));
    assert_eq!(sandbox.store()["counter"], json!(165));
}

/// Scenario 4: blob extraction from an image-shaped tool result.
#[tokio::test]
async fn scenario_4_blob_extraction() {
    let mut sandbox = Sandbox::new(vec![screenshot_tool()]).expect("sandbox");
    let result = sandbox
        .execute("return await tool('screenshot', {});")
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let value = result.result.unwrap();
    assert_eq!(value["type"], json!("blob_ref"));
    assert_eq!(value["mimeType"], json!("image/png"));
    let id = value["id"].as_str().expect("id string");
    let pattern = Regex::new(r"^blob_[a-z0-9]{6}$").unwrap();
    assert!(pattern.is_match(id), "id {id} does not match pattern");

    assert_eq!(result.blobs.len(), 1);
    assert_eq!(result.blobs[0].id, id);
    assert_eq!(result.blobs[0].data, "c2NyZWVuc2hvdA==");
}

/// Scenario 6: before-hook short-circuit and before-hook rejection.
#[tokio::test]
async fn scenario_6_event_interception() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use toolmode_sandbox::EventHooks;

    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let cached_hooks = EventHooks::new().on_before_tool_call(move |event| {
        flag.store(true, Ordering::SeqCst);
        event.return_value = Some(json!({"cached": true}));
        Ok(())
    });

    let mut sandbox = toolmode_sandbox::SandboxBuilder::new()
        .with_tool(add_tool())
        .event_hooks(cached_hooks)
        .build()
        .expect("sandbox");
    let result = sandbox
        .execute("return await tool('add', { a: 1, b: 1 });")
        .await;
    assert!(result.success);
    assert_eq!(result.result.unwrap(), json!({"cached": true}));

    let blocking_hooks = EventHooks::new().on_before_tool_call(|_| Err("Blocked".to_string()));
    let mut blocked = toolmode_sandbox::SandboxBuilder::new()
        .with_tool(add_tool())
        .event_hooks(blocking_hooks)
        .build()
        .expect("sandbox");
    let result = blocked
        .execute("return await tool('add', { a: 1, b: 1 });")
        .await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap(), "Blocked");
}
