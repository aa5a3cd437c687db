//! An embeddable sandbox that lets untrusted guest scripts call host-defined
//! async tools.
//!
//! A [`Sandbox`] owns a [`Registry`] of [`Tool`]s and a JSON [`Store`] that
//! survives across executions. Each call to [`Sandbox::execute`] provisions a
//! fresh guest VM, evaluates the given source as an async block, and pumps
//! host tool calls back into the guest through a single bridge function
//! (`tool(name, args)`) until the guest's top-level promise settles, times
//! out, or the result overflows the configured size cap.
//!
//! ```no_run
//! # use serde_json::json;
//! # use toolmode_sandbox::{Sandbox, Tool, ToolFuture};
//! # async fn run() {
//! let add = Tool::new(
//!     "add",
//!     json!({"type": "object", "properties": {"a": {}, "b": {}}}),
//!     |args: serde_json::Value| -> ToolFuture {
//!         Box::pin(async move {
//!             let a = args["a"].as_f64().unwrap_or(0.0);
//!             let b = args["b"].as_f64().unwrap_or(0.0);
//!             Ok(json!(a + b))
//!         })
//!     },
//! )
//! .expect("valid tool");
//!
//! let mut sandbox = Sandbox::new(vec![add]).expect("sandbox");
//! let result = sandbox.execute("return await tool('add', {a: 2, b: 3});").await;
//! assert!(result.success);
//! # }
//! ```

mod blob;
mod bridge;
mod engine;
mod error;
mod events;
mod sandbox;
mod store;
mod tool;
mod value;

pub use blob::{Blob, BlobTable};
pub use engine::{EngineConfig, ExecuteResult};
pub use error::SandboxError;
pub use events::{
    BeforeToolCall, EventHooks, ToolCallError as ToolCallErrorEvent, ToolCallSuccess,
};
pub use sandbox::{Sandbox, SandboxBuilder};
pub use tool::{Registry, Tool, ToolFuture, ToolHandler};
