use serde_json::Value;
use std::sync::Arc;

/// Assembled before a handler (or a short-circuiting `returnValue`) runs.
/// The before-hook may overwrite `args` and/or set `return_value` to skip
/// the handler entirely.
#[derive(Debug, Clone)]
pub struct BeforeToolCall {
    pub tool_name: String,
    pub args: Value,
    pub return_value: Option<Value>,
}

/// Assembled after a handler fulfils, or after a `returnValue` short-circuit.
/// The success-hook may overwrite `result`.
#[derive(Debug, Clone)]
pub struct ToolCallSuccess {
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
}

/// Assembled after a handler rejects. The error-hook may set `result` to
/// recover the failure into a success; the guest cannot distinguish a
/// recovered result from a natural one.
#[derive(Debug, Clone)]
pub struct ToolCallError {
    pub tool_name: String,
    pub args: Value,
    pub error: String,
    pub result: Option<Value>,
}

type BeforeHook = Arc<dyn Fn(&mut BeforeToolCall) -> Result<(), String> + Send + Sync>;
type SuccessHook = Arc<dyn Fn(&mut ToolCallSuccess) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&mut ToolCallError) + Send + Sync>;

/// Optional host callbacks invoked before/after each `tool()` call. Absent
/// hooks are a no-op pass-through.
#[derive(Clone, Default)]
pub struct EventHooks {
    before: Option<BeforeHook>,
    success: Option<SuccessHook>,
    error: Option<ErrorHook>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the before-call hook. Returning `Err(message)` rejects the
    /// guest's promise with that message and skips the handler entirely.
    pub fn on_before_tool_call(
        mut self,
        hook: impl Fn(&mut BeforeToolCall) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_call_success(
        mut self,
        hook: impl Fn(&mut ToolCallSuccess) + Send + Sync + 'static,
    ) -> Self {
        self.success = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_call_error(
        mut self,
        hook: impl Fn(&mut ToolCallError) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn run_before(&self, event: &mut BeforeToolCall) -> Result<(), String> {
        match &self.before {
            Some(hook) => hook(event),
            None => Ok(()),
        }
    }

    pub(crate) fn run_success(&self, event: &mut ToolCallSuccess) {
        if let Some(hook) = &self.success {
            hook(event);
        }
    }

    pub(crate) fn run_error(&self, event: &mut ToolCallError) {
        if let Some(hook) = &self.error {
            hook(event);
        }
    }
}

/// Run the event pipeline for one `tool(name, args)` call and produce
/// either a value to resolve the guest promise with, or a message to
/// reject it with.
///
/// `call` performs the lookup + handler invocation for a known tool name;
/// it is only called when no `returnValue` short-circuit occurs.
pub(crate) async fn run_pipeline<F, Fut>(
    tool_name: &str,
    mut args: Value,
    hooks: &EventHooks,
    call: F,
) -> Result<Value, String>
where
    F: FnOnce(Value) -> Fut,
    Fut: std::future::Future<Output = Result<Value, String>>,
{
    let mut before = BeforeToolCall {
        tool_name: tool_name.to_string(),
        args: args.clone(),
        return_value: None,
    };
    hooks.run_before(&mut before)?;
    args = before.args;

    if let Some(return_value) = before.return_value {
        let mut success = ToolCallSuccess {
            tool_name: tool_name.to_string(),
            args,
            result: return_value,
        };
        hooks.run_success(&mut success);
        return Ok(success.result);
    }

    match call(args.clone()).await {
        Ok(result) => {
            let mut success = ToolCallSuccess {
                tool_name: tool_name.to_string(),
                args,
                result,
            };
            hooks.run_success(&mut success);
            Ok(success.result)
        }
        Err(error) => {
            let mut event = ToolCallError {
                tool_name: tool_name.to_string(),
                args,
                error,
                result: None,
            };
            hooks.run_error(&mut event);
            match event.result {
                Some(result) => Ok(result),
                None => Err(event.error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn success_path_runs_success_hook() {
        let hooks = EventHooks::new().on_tool_call_success(|e| {
            e.result = json!({"wrapped": e.result});
        });
        let result = run_pipeline("t", json!({}), &hooks, |_| async { Ok(json!(5)) }).await;
        assert_eq!(result.unwrap(), json!({"wrapped": 5}));
    }

    #[tokio::test]
    async fn before_hook_can_mutate_args() {
        let hooks = EventHooks::new().on_before_tool_call(|e| {
            e.args = json!({"patched": true});
            Ok(())
        });
        let result = run_pipeline("t", json!({}), &hooks, |args| async move { Ok(args) }).await;
        assert_eq!(result.unwrap(), json!({"patched": true}));
    }

    #[tokio::test]
    async fn before_hook_short_circuit_skips_handler() {
        let called = std::sync::Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let hooks = EventHooks::new().on_before_tool_call(|e| {
            e.return_value = Some(json!("cached"));
            Ok(())
        });
        let result = run_pipeline("t", json!({}), &hooks, move |_| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(json!("real")) }
        })
        .await;
        assert_eq!(result.unwrap(), json!("cached"));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn before_hook_error_rejects_without_calling_handler() {
        let hooks = EventHooks::new().on_before_tool_call(|_| Err("Blocked".to_string()));
        let result = run_pipeline("t", json!({}), &hooks, |_| async { Ok(json!(1)) }).await;
        assert_eq!(result.unwrap_err(), "Blocked");
    }

    #[tokio::test]
    async fn error_hook_can_recover() {
        let hooks = EventHooks::new().on_tool_call_error(|e| {
            e.result = Some(json!({"recovered": true}));
        });
        let result =
            run_pipeline("t", json!({}), &hooks, |_| async { Err("boom".to_string()) }).await;
        assert_eq!(result.unwrap(), json!({"recovered": true}));
    }

    #[tokio::test]
    async fn unrecovered_error_rejects() {
        let hooks = EventHooks::new();
        let result =
            run_pipeline("t", json!({}), &hooks, |_| async { Err("boom".to_string()) }).await;
        assert_eq!(result.unwrap_err(), "boom");
    }
}
