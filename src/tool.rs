use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::SandboxError;

/// The reserved names every registry carries built-in implementations for,
/// plus `execute` itself. None of these can be shadowed by a user tool.
pub const RESERVED_NAMES: [&str; 5] =
    ["execute", "describe_tool", "list_tools", "sleep", "get_blob"];

/// A boxed future returned by a [`Tool`] handler. Not required to be `Send` —
/// the engine drives every execution on a single task, so handlers are free
/// to use non-`Send` async building blocks as long as the closure producing
/// the future is itself `Send + Sync` (so a [`Tool`] can be shared across
/// executions).
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, String>>>>;

/// Host-side asynchronous function from a JSON-shaped argument value to a
/// JSON-shaped result value, or an error message string.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A named handler with a JSON-schema description of its inputs and,
/// optionally, its outputs.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub handler: ToolHandler,
}

impl Tool {
    /// Build a tool from a name, an object-typed input schema, and a handler.
    ///
    /// Fails with [`SandboxError::InvalidInputSchema`] if `input_schema` is
    /// not a JSON object with `"type": "object"`, or is not itself a
    /// syntactically valid JSON Schema document.
    pub fn new(
        name: impl Into<String>,
        input_schema: Value,
        handler: impl Fn(Value) -> ToolFuture + Send + Sync + 'static,
    ) -> Result<Self, SandboxError> {
        let name = name.into();
        validate_input_schema(&name, &input_schema)?;
        Ok(Self {
            name,
            title: None,
            description: None,
            input_schema,
            output_schema: None,
            handler: Arc::new(handler),
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }
}

fn validate_input_schema(name: &str, schema: &Value) -> Result<(), SandboxError> {
    let Some(obj) = schema.as_object() else {
        return Err(SandboxError::InvalidInputSchema(
            name.to_string(),
            "inputSchema must be a JSON object".to_string(),
        ));
    };
    if obj.get("type").and_then(Value::as_str) != Some("object") {
        return Err(SandboxError::InvalidInputSchema(
            name.to_string(),
            "inputSchema.type must be \"object\"".to_string(),
        ));
    }
    if let Err(err) = jsonschema::validator_for(schema) {
        return Err(SandboxError::InvalidInputSchema(
            name.to_string(),
            format!("not a valid JSON Schema document: {err}"),
        ));
    }
    Ok(())
}

/// An ordered catalog of [`Tool`]s with a uniqueness invariant on `name`.
///
/// Four built-ins (`describe_tool`, `list_tools`, `sleep`, `get_blob`) are
/// always present, appended after any user tools given at construction. The
/// reserved name `execute` belongs to the sandbox facade, not the registry.
pub struct Registry {
    tools: Vec<Tool>,
}

impl Registry {
    /// Build a registry from a list of user tools, appending the built-ins.
    ///
    /// Fails if two tools share a name, or if a user tool reuses a reserved
    /// name.
    pub fn new(tools: Vec<Tool>) -> Result<Self, SandboxError> {
        let mut registry = Self { tools: Vec::new() };
        for tool in tools {
            registry.add(tool)?;
        }
        registry.install_builtins();
        Ok(registry)
    }

    fn install_builtins(&mut self) {
        // Installed directly into `tools` (bypassing `add`'s reserved-name
        // check, which exists to keep *user* tools from shadowing these).
        self.tools.push(builtin_describe_tool());
        self.tools.push(builtin_list_tools());
        self.tools.push(builtin_sleep());
        self.tools.push(builtin_get_blob());
    }

    /// Register a new tool. Fails on a name collision, reserved-name reuse,
    /// or an invalid input schema (the latter is caught by [`Tool::new`]
    /// already, but is re-stated here for callers constructing `Tool` by
    /// hand).
    pub fn add(&mut self, tool: Tool) -> Result<(), SandboxError> {
        if RESERVED_NAMES.contains(&tool.name.as_str()) {
            return Err(SandboxError::ReservedToolName(tool.name));
        }
        if self.tools.iter().any(|t| t.name == tool.name) {
            return Err(SandboxError::DuplicateToolName(tool.name));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Remove a tool by name. Fails with [`SandboxError::ToolNotFound`] if no
    /// tool (including a built-in) has that name.
    pub fn remove(&mut self, name: &str) -> Result<(), SandboxError> {
        let before = self.tools.len();
        self.tools.retain(|t| t.name != name);
        if self.tools.len() == before {
            return Err(SandboxError::ToolNotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    /// Human-readable description of the `execute` tool, embedding the
    /// sorted, comma-separated list of currently registered tool names.
    /// Recompute after every mutation.
    pub fn execute_tool_description(&self) -> String {
        let names: BTreeSet<&str> = self.tools.iter().map(|t| t.name.as_str()).collect();
        let names = names.into_iter().collect::<Vec<_>>().join(", ");
        format!(
            "Execute a script against the tool catalog. The script runs in a \
             sandboxed scripting engine with one bridge function, \
             `await tool(name, args)`, which invokes a tool by name and \
             returns its result. The script's final `return` value becomes \
             the result.\n\n\
             Available tools: {names}.\n\n\
             Limitations: no filesystem, network, timers, or module loader; \
             use `tool('sleep', {{ms}})` instead of `setTimeout`."
        )
    }
}

fn builtin_describe_tool() -> Tool {
    Tool::new(
        "describe_tool",
        json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}),
        // The closure here is never called: the bridge special-cases this
        // name and answers from the live tool snapshot instead, since a
        // `Tool` cannot borrow the `Registry` that owns it. See
        // `bridge::dispatch`.
        |_args: Value| -> ToolFuture { Box::pin(async move { Ok(Value::Null) }) },
    )
    .expect("builtin schema is valid")
    .with_description("Describe a registered tool by name.")
}

fn builtin_list_tools() -> Tool {
    Tool::new(
        "list_tools",
        json!({"type": "object", "properties": {}}),
        |_args: Value| -> ToolFuture { Box::pin(async move { Ok(Value::Null) }) },
    )
    .expect("builtin schema is valid")
    .with_description("List every registered tool's name and description.")
}

fn builtin_sleep() -> Tool {
    Tool::new(
        "sleep",
        json!({"type": "object", "properties": {"ms": {"type": "number"}}, "required": ["ms"]}),
        |args: Value| -> ToolFuture {
            Box::pin(async move {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(json!({"slept": ms}))
            })
        },
    )
    .expect("builtin schema is valid")
    .with_description("Resolve after approximately `ms` milliseconds.")
}

fn builtin_get_blob() -> Tool {
    Tool::new(
        "get_blob",
        json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        // Resolved against the current execution's blob table by the
        // bridge (`bridge::dispatch`), same as `describe_tool`/`list_tools`.
        |_args: Value| -> ToolFuture { Box::pin(async move { Ok(Value::Null) }) },
    )
    .expect("builtin schema is valid")
    .with_description("Fetch a blob captured earlier in this execution by id.")
}
