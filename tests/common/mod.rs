//! Shared test helpers: small tool constructors used across the
//! integration suites.

use serde_json::{Value, json};
use toolmode_sandbox::{Tool, ToolFuture};

/// A tool whose schema accepts any object and whose handler echoes the
/// input back unchanged.
pub fn echo_tool(name: &str) -> Tool {
    Tool::new(name, json!({"type": "object", "properties": {}}), |args| {
        Box::pin(async move { Ok(args) })
    })
    .expect("valid tool")
}

/// `add({a, b}) -> a + b`, per §8 scenario 1.
pub fn add_tool() -> Tool {
    Tool::new(
        "add",
        json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}, "required": ["a", "b"]}),
        |args: Value| -> ToolFuture {
            Box::pin(async move {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                Ok(json!(a + b))
            })
        },
    )
    .expect("valid tool")
}

/// `echo({message}) -> {echoed: message}`, per §8 scenario 2.
pub fn echoed_message_tool() -> Tool {
    Tool::new(
        "echo",
        json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
        |args: Value| -> ToolFuture {
            Box::pin(async move { Ok(json!({"echoed": args["message"]})) })
        },
    )
    .expect("valid tool")
}

/// A tool that always fails with `message`.
pub fn failing_tool(name: &str, message: &'static str) -> Tool {
    Tool::new(name, json!({"type": "object", "properties": {}}), move |_args| {
        Box::pin(async move { Err(message.to_string()) })
    })
    .expect("valid tool")
}

/// A tool returning an image-shaped payload, per §8 scenario 4.
pub fn screenshot_tool() -> Tool {
    Tool::new(
        "screenshot",
        json!({"type": "object", "properties": {}}),
        |_args| {
            Box::pin(async move {
                Ok(json!({"type": "image", "data": "c2NyZWVuc2hvdA==", "mimeType": "image/png"}))
            })
        },
    )
    .expect("valid tool")
}
