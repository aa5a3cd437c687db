//! The embeddable facade: [`Sandbox`] and its [`SandboxBuilder`].

use serde_json::Value;
use tracing::debug;

use crate::engine::{self, EngineConfig, ExecuteResult};
use crate::error::SandboxError;
use crate::events::EventHooks;
use crate::tool::{Registry, Tool};

/// Builds a [`Sandbox`] from an initial tool list and engine tunables.
#[derive(Default)]
pub struct SandboxBuilder {
    tools: Vec<Tool>,
    config: EngineConfig,
    hooks: EventHooks,
}

impl SandboxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn max_result_chars(mut self, max: usize) -> Self {
        self.config.max_result_chars = max;
        self
    }

    pub fn max_poll_iterations(mut self, max: u32) -> Self {
        self.config.max_poll_iterations = max;
        self
    }

    pub fn poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn event_hooks(mut self, hooks: EventHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<Sandbox, SandboxError> {
        let registry = Registry::new(self.tools)?;
        Ok(Sandbox {
            registry,
            config: self.config,
            hooks: self.hooks,
            store: Value::Object(serde_json::Map::new()),
            prev_result: Value::Null,
            execution_count: 0,
        })
    }
}

/// One guest VM's worth of persistent state: its tool catalog, its store,
/// and the previous execution's result. Each `execute` call provisions a
/// fresh engine and tears it down afterwards; only `store` and
/// `prev_result` carry over between calls.
pub struct Sandbox {
    registry: Registry,
    config: EngineConfig,
    hooks: EventHooks,
    store: Value,
    prev_result: Value,
    execution_count: u64,
}

impl Sandbox {
    /// Build a sandbox from an initial tool list, using default tunables
    /// and no event hooks. Use [`SandboxBuilder`] for anything more.
    pub fn new(tools: Vec<Tool>) -> Result<Self, SandboxError> {
        SandboxBuilder::new().with_tools(tools).build()
    }

    /// Run `code` as a guest program against the current tool catalog and
    /// store. Never returns `Err`: guest compile errors, guest exceptions,
    /// rejected tool calls, and timeouts are all folded into a
    /// non-`success` [`ExecuteResult`].
    pub async fn execute(&mut self, code: &str) -> ExecuteResult {
        self.execution_count += 1;
        let tools: Vec<Tool> = self.registry.iter().cloned().collect();
        let local = tokio::task::LocalSet::new();
        let (result, new_store) = local
            .run_until(engine::execute(
                self.execution_count,
                &self.config,
                &tools,
                &self.hooks,
                code,
                self.store.clone(),
                self.prev_result.clone(),
            ))
            .await;

        self.store = new_store;
        self.prev_result = result.result.clone().unwrap_or(Value::Null);
        debug!(success = result.success, "execute finished");
        result
    }

    /// Register a new tool, refreshing the `execute` tool's description.
    pub fn add_tool(&mut self, tool: Tool) -> Result<(), SandboxError> {
        self.registry.add(tool)
    }

    /// Remove a tool by name, refreshing the `execute` tool's description.
    pub fn remove_tool(&mut self, name: &str) -> Result<(), SandboxError> {
        self.registry.remove(name)
    }

    /// The human-readable description of the `execute` tool, reflecting the
    /// currently registered catalog.
    pub fn execute_description(&self) -> String {
        self.registry.execute_tool_description()
    }

    pub fn store(&self) -> &Value {
        &self.store
    }

    /// Replace the whole store. A non-object value is coerced to `{}`,
    /// matching the store's mapping data model.
    pub fn set_store(&mut self, store: Value) {
        self.store = Value::Object(crate::store::coerce_to_object(store));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            json!({"type": "object", "properties": {"value": {}}}),
            |args| Box::pin(async move { Ok(args) }),
        )
        .expect("valid tool")
    }

    #[tokio::test]
    async fn executes_a_returning_script() {
        let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
        let result = sandbox.execute("return 1 + 1;").await;
        assert!(result.success);
        assert_eq!(result.result.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn calls_a_registered_tool() {
        let mut sandbox = Sandbox::new(vec![echo_tool()]).expect("sandbox");
        let result = sandbox
            .execute("return await tool('echo', { value: 42 });")
            .await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.result.unwrap(), json!({"value": 42}));
    }

    #[tokio::test]
    async fn store_persists_across_executions() {
        let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
        let first = sandbox.execute("store.count = 1; return store.count;").await;
        assert!(first.success);
        let second = sandbox
            .execute("store.count += 1; return store.count;")
            .await;
        assert!(second.success);
        assert_eq!(second.result.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn prev_reflects_previous_result() {
        let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
        let first = sandbox.execute("return 'first';").await;
        assert!(first.success);
        let second = sandbox.execute("return store._prev;").await;
        assert!(second.success);
        assert_eq!(second.result.unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn unknown_tool_rejects_with_message() {
        let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
        let result = sandbox
            .execute("try { await tool('nope', {}); return 'unreachable'; } catch (e) { return e.message; }")
            .await;
        assert!(result.success);
        assert_eq!(result.result.unwrap(), json!("Tool not found: nope"));
    }

    #[tokio::test]
    async fn set_timeout_reference_gets_a_hint() {
        let mut sandbox = Sandbox::new(vec![]).expect("sandbox");
        let result = sandbox.execute("setTimeout(() => {}, 10);").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("tool('sleep'"));
    }
}
