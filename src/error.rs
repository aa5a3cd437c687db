use thiserror::Error;

/// Failures that the host API surfaces synchronously, as opposed to the
/// per-execution failures folded into [`crate::ExecuteResult`].
///
/// Registry mutation (`add_tool`/`remove_tool`) and sandbox construction are
/// the only operations that return this type; a guest error, a tool handler
/// rejection, or a timeout never does — those settle into `ExecuteResult`
/// instead, per the crate's propagation policy.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool name '{0}' is reserved and cannot be registered")]
    ReservedToolName(String),

    #[error("Invalid input schema for tool '{0}': {1}")]
    InvalidInputSchema(String, String),

    #[error("Internal sandbox error: {0}")]
    Internal(String),
}
