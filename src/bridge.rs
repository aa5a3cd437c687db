//! The host-exposed `tool(name, args)` function and its resolution queue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Persistent, Promise, Value as JsValue};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;

use crate::blob::{BlobTable, extract_blobs};
use crate::events::{EventHooks, run_pipeline};
use crate::tool::Tool;
use crate::value::{js_to_json, json_to_js};

/// Outcome of one tool call, dequeued and applied to the guest VM in FIFO
/// completion order by the engine's polling loop.
pub(crate) struct Resolution {
    pub call_id: u64,
    pub outcome: Result<Value, String>,
}

/// Resolve/reject function pair for a guest-side promise awaiting a host
/// task, kept alive across await points via `Persistent`.
type PendingEntry = (Persistent<Function<'static>>, Persistent<Function<'static>>);

/// The pending-call table shared between the bridge's `tool` closure and the
/// engine's polling loop.
pub(crate) type PendingMap = Rc<RefCell<HashMap<u64, PendingEntry>>>;

/// Shared state the `tool` function closure captures. Lives for the
/// duration of one execution.
pub(crate) struct BridgeState {
    pub snapshot: Rc<Vec<Tool>>,
    pub blobs: Rc<RefCell<BlobTable>>,
    pub hooks: EventHooks,
    pub pending: PendingMap,
    pub next_id: Rc<RefCell<u64>>,
    pub tx: UnboundedSender<Resolution>,
}

/// Install the `tool` global function into `ctx`, bound to `state`.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, state: BridgeState) -> rquickjs::Result<()> {
    let func = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, name: String, args: Opt<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let args_json = match args.0 {
                Some(v) if !v.is_undefined() => js_to_json(&v).unwrap_or_else(|_| json!({})),
                _ => json!({}),
            };

            let (promise, resolve_fn, reject_fn) = Promise::new(ctx.clone())?;

            let call_id = {
                let mut counter = state.next_id.borrow_mut();
                let id = *counter;
                *counter += 1;
                id
            };
            state.pending.borrow_mut().insert(
                call_id,
                (
                    Persistent::save(&ctx, resolve_fn),
                    Persistent::save(&ctx, reject_fn),
                ),
            );

            let snapshot = state.snapshot.clone();
            let blobs = state.blobs.clone();
            let hooks = state.hooks.clone();
            let tx = state.tx.clone();
            let name_owned = name;

            tokio::task::spawn_local(async move {
                let outcome = dispatch(&name_owned, args_json, &snapshot, &blobs, &hooks).await;
                let outcome = outcome.map(|value| {
                    let mut blobs = blobs.borrow_mut();
                    extract_blobs(&value, &mut blobs)
                });
                let _ = tx.send(Resolution { call_id, outcome });
            });

            Ok(promise.into_value())
        },
    )?;
    ctx.globals().set("tool", func)?;
    Ok(())
}

/// Look up and invoke a tool (user-defined or built-in), running it through
/// the event pipeline. A tool-not-found lookup failure bypasses the pipeline
/// entirely and rejects directly, per the bridge's step ordering.
async fn dispatch(
    name: &str,
    args: Value,
    snapshot: &Rc<Vec<Tool>>,
    blobs: &Rc<RefCell<BlobTable>>,
    hooks: &EventHooks,
) -> Result<Value, String> {
    let Some(tool) = snapshot.iter().find(|t| t.name == name) else {
        return Err(format!("Tool not found: {name}"));
    };

    match name {
        "describe_tool" => {
            run_pipeline(name, args, hooks, |args| async move {
                Ok(describe_tool(&args, snapshot))
            })
            .await
        }
        "list_tools" => {
            run_pipeline(name, args, hooks, |_args| async move { Ok(list_tools(snapshot)) }).await
        }
        "get_blob" => {
            let blobs = blobs.clone();
            run_pipeline(name, args, hooks, move |args| async move {
                Ok(get_blob(&args, &blobs))
            })
            .await
        }
        _ => {
            let handler = tool.handler.clone();
            run_pipeline(name, args, hooks, move |args| handler(args)).await
        }
    }
}

fn describe_tool(args: &Value, snapshot: &[Tool]) -> Value {
    let Some(name) = args.get("name").and_then(Value::as_str) else {
        return json!({"error": "Tool not found: "});
    };
    match snapshot.iter().find(|t| t.name == name) {
        Some(tool) => json!({
            "name": tool.name,
            "description": tool.description,
            "inputSchema": tool.input_schema,
            "outputSchema": tool.output_schema,
        }),
        None => json!({"error": format!("Tool not found: {name}")}),
    }
}

fn list_tools(snapshot: &[Tool]) -> Value {
    Value::Array(
        snapshot
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description}))
            .collect(),
    )
}

fn get_blob(args: &Value, blobs: &Rc<RefCell<BlobTable>>) -> Value {
    let Some(id) = args.get("id").and_then(Value::as_str) else {
        return json!({"error": "Blob not found: "});
    };
    match blobs.borrow().get(id) {
        Some(blob) => json!({"id": blob.id, "data": blob.data, "mimeType": blob.mime_type}),
        None => json!({"error": format!("Blob not found: {id}")}),
    }
}

/// Apply a dequeued [`Resolution`] to the guest VM: materialise the JSON
/// value into a guest value (falling back to a string if that fails) and
/// resolve or reject the matching promise.
pub(crate) fn apply_resolution<'js>(
    ctx: &Ctx<'js>,
    pending: &PendingMap,
    resolution: Resolution,
) -> rquickjs::Result<()> {
    let Some((resolve, reject)) = pending.borrow_mut().remove(&resolution.call_id) else {
        // Already torn down or double-delivered; nothing to do.
        return Ok(());
    };

    match resolution.outcome {
        Ok(value) => {
            let resolve: Function<'js> = resolve.restore(ctx)?;
            let js_value = json_to_js(ctx, &value)
                .unwrap_or_else(|_| JsValue::from(rquickjs::String::from_str(ctx.clone(), &value.to_string()).expect("string alloc")));
            resolve.call::<_, ()>((js_value,))?;
        }
        Err(message) => {
            let reject: Function<'js> = reject.restore(ctx)?;
            let error = rquickjs::Exception::from_message(ctx.clone(), &message)?;
            reject.call::<_, ()>((error.into_value(),))?;
        }
    }
    Ok(())
}
