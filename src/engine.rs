//! The execution engine: VM provisioning, the guest/host polling loop, and
//! result shaping.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rquickjs::{Context, Object, Persistent, Promise, PromiseState, Runtime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::blob::{Blob, BlobTable};
use crate::bridge::{self, BridgeState};
use crate::events::EventHooks;
use crate::store;
use crate::tool::Tool;

/// Tunables for one sandbox's executions. Construct through
/// [`crate::SandboxBuilder`] rather than directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Executions whose JSON-serialised result exceeds this many characters
    /// are reported as a truncation error instead of a success.
    pub max_result_chars: usize,
    /// Upper bound on polling-loop iterations before an execution is
    /// abandoned as timed out.
    pub max_poll_iterations: u32,
    /// How long to wait for a tool-call resolution between poll iterations.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_result_chars: 40_000,
            max_poll_iterations: 500,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// The outcome of one `Sandbox::execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub blobs: Vec<Blob>,
}

impl ExecuteResult {
    fn ok(result: Value, blobs: Vec<Blob>) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            blobs,
        }
    }

    fn err(message: impl Into<String>, blobs: Vec<Blob>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
            blobs,
        }
    }
}

/// Run one guest program against a tool snapshot. Returns the execution
/// result and the store as it stood when the guest program settled (or, on
/// a compile error, the store unchanged).
///
/// Must be called from within a [`tokio::task::LocalSet`] — the tool bridge
/// spawns host tasks via `spawn_local` because guest values are not `Send`.
#[tracing::instrument(skip(config, tools, hooks, code, store, prev_result), fields(tool_count = tools.len()))]
pub(crate) async fn execute(
    execution_id: u64,
    config: &EngineConfig,
    tools: &[Tool],
    hooks: &EventHooks,
    code: &str,
    store: Value,
    prev_result: Value,
) -> (ExecuteResult, Value) {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => return (ExecuteResult::err(format!("failed to start engine: {e}"), vec![]), store),
    };
    let context = match Context::full(&runtime) {
        Ok(ctx) => ctx,
        Err(e) => return (ExecuteResult::err(format!("failed to start engine: {e}"), vec![]), store),
    };

    let main_fulfilled = Rc::new(Cell::new(false));
    {
        let flag = main_fulfilled.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.get())));
    }

    let blobs = Rc::new(RefCell::new(BlobTable::new()));
    let snapshot = Rc::new(tools.to_vec());
    let pending = Rc::new(RefCell::new(HashMap::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let store_json = serde_json::to_string(&store).unwrap_or_else(|_| "{}".to_string());
    let prev_json = serde_json::to_string(&prev_result).unwrap_or_else(|_| "null".to_string());

    let main_promise: Persistent<Promise<'static>> = match context.with(|ctx| -> rquickjs::Result<_> {
        bridge::install(
            &ctx,
            BridgeState {
                snapshot: snapshot.clone(),
                blobs: blobs.clone(),
                hooks: hooks.clone(),
                pending: pending.clone(),
                next_id: Rc::new(RefCell::new(0)),
                tx: tx.clone(),
            },
        )?;
        ctx.eval::<(), _>(store::hydrate_script(&store_json, &prev_json))?;
        install_globals(&ctx)?;

        let wrapped = wrap_program(code);
        let promise: Promise = ctx.eval(wrapped)?;
        Ok(Persistent::save(&ctx, promise))
    }) {
        Ok(promise) => promise,
        Err(e) => {
            let message = friendly_message(&format!("{e}"));
            return (ExecuteResult::err(message, vec![]), store);
        }
    };
    drop(tx);

    let mut iterations: u32 = 0;
    let outcome = loop {
        if iterations >= config.max_poll_iterations {
            break Err("Execution timed out".to_string());
        }
        iterations += 1;

        match tokio::time::timeout(config.poll_interval, rx.recv()).await {
            Ok(Some(resolution)) => {
                apply_one(&context, &pending, resolution, &main_fulfilled);
                while let Ok(resolution) = rx.try_recv() {
                    apply_one(&context, &pending, resolution, &main_fulfilled);
                }
            }
            Ok(None) => {}
            Err(_elapsed) => {}
        }

        while runtime.is_job_pending() {
            if let Err(e) = runtime.execute_pending_job() {
                warn!(error = %e, "pending job failed");
            }
        }

        let state = context.with(|ctx| {
            let promise = main_promise.clone().restore(&ctx).expect("promise alive");
            promise.state()
        });

        match state {
            PromiseState::Pending => continue,
            PromiseState::Fulfilled => {
                main_fulfilled.set(true);
                let value = context.with(|ctx| {
                    let promise = main_promise.clone().restore(&ctx).expect("promise alive");
                    promise
                        .result::<rquickjs::Value>()
                        .ok()
                        .and_then(|v| crate::value::js_to_json(&v).ok())
                        .unwrap_or(Value::Null)
                });
                break Ok(value);
            }
            PromiseState::Rejected => {
                main_fulfilled.set(true);
                let message = context.with(|ctx| {
                    let promise = main_promise.clone().restore(&ctx).expect("promise alive");
                    match promise.result::<rquickjs::Value>() {
                        Ok(v) => extract_rejection_message(&v),
                        Err(e) => format!("{e}"),
                    }
                });
                break Err(friendly_message(&message));
            }
        }
    };

    let new_store = context.with(|ctx| -> rquickjs::Result<Value> {
        let globals = ctx.globals();
        let store_obj: Object = globals.get("store")?;
        let value = crate::value::js_to_json(&store_obj.into_value())
            .unwrap_or(Value::Object(serde_json::Map::new()));
        Ok(store::strip_prev(value))
    })
    .unwrap_or(store);

    debug!(iterations, "execution settled");
    drop(main_promise);
    drop(context);
    drop(runtime);

    // Not `Rc::try_unwrap`: a still-in-flight or abandoned tool task (a
    // `Promise.race` loser, a fire-and-forget call, the timeout path) can
    // hold another strong ref at this point, which would make unwrapping
    // fail and silently drop every blob captured so far.
    let collected_blobs = std::mem::take(&mut *blobs.borrow_mut()).into_vec();

    let result = match outcome {
        Ok(value) => {
            let serialised = serde_json::to_string(&value).unwrap_or_default();
            if serialised.len() > config.max_result_chars {
                let mut truncated = ExecuteResult::ok(value, collected_blobs);
                truncated.error = Some(format!(
                    "Result truncated ({} > {} chars)",
                    serialised.len(),
                    config.max_result_chars
                ));
                truncated
            } else {
                ExecuteResult::ok(value, collected_blobs)
            }
        }
        Err(message) => ExecuteResult::err(message, collected_blobs),
    };

    (result, new_store)
}

fn apply_one(
    context: &Context,
    pending: &bridge::PendingMap,
    resolution: bridge::Resolution,
    main_fulfilled: &Rc<Cell<bool>>,
) {
    if main_fulfilled.get() {
        // The main promise already settled (or a sibling in a Promise.race
        // already won); a late resolution from an abandoned task is dropped.
        pending.borrow_mut().remove(&resolution.call_id);
        return;
    }
    context.with(|ctx| {
        if let Err(e) = bridge::apply_resolution(&ctx, pending, resolution) {
            warn!(error = %e, "failed to apply tool resolution");
        }
    });
}

fn install_globals(ctx: &rquickjs::Ctx<'_>) -> rquickjs::Result<()> {
    use base64::Engine as _;
    let globals = ctx.globals();

    let btoa = rquickjs::Function::new(ctx.clone(), |s: String| -> String {
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
    })?;
    globals.set("btoa", btoa)?;

    let atob = rquickjs::Function::new(ctx.clone(), |s: String| -> rquickjs::Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(|_| rquickjs::Error::Exception)?;
        String::from_utf8(bytes).map_err(|_| rquickjs::Error::Exception)
    })?;
    globals.set("atob", atob)?;

    Ok(())
}

fn wrap_program(code: &str) -> String {
    format!("(async () => {{\n{code}\n}})()")
}

/// Extract a human-readable message from a rejected promise's value.
///
/// Goes straight through `rquickjs::Object::get` rather than
/// `value::js_to_json`: a thrown `Error`'s `message` is a non-enumerable own
/// property, and `js_to_json` only walks enumerable keys, so it would see an
/// empty object for any standard `Error`. Falls back to the JSON form of the
/// rejection value for non-`Error` throws (a string, a plain object, etc.).
fn extract_rejection_message(value: &rquickjs::Value<'_>) -> String {
    if let Some(message) = value
        .as_object()
        .and_then(|obj| obj.get::<_, String>("message").ok())
    {
        return message;
    }
    match crate::value::js_to_json(value) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "guest execution failed".to_string(),
    }
}

/// Append a hint for the most common "not defined" guest mistake: reaching
/// for a timer API that doesn't exist in this engine.
fn friendly_message(message: &str) -> String {
    if message.contains("is not defined")
        && (message.contains("setTimeout") || message.contains("setInterval"))
    {
        format!("{message} (use `await tool('sleep', {{ ms }})` instead)")
    } else {
        message.to_string()
    }
}
