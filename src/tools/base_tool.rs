//! Tool abstraction for exposing tracker operations to agents.
//!
//! Provides the [`BaseTool`] trait, the [`ToolError`] type, and the concrete
//! [`Tool`] struct that wraps a callable function.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::tracker::TrackerError;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// The tracker rejected the call.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Arguments did not match the tool's schema.
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to encode {tool} response: {message}")]
    Encode { tool: String, message: String },
}

impl ToolError {
    /// Whether the error names something that does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ToolError::Tracker(e) => e.is_not_found(),
            ToolError::UnknownTool(_) => true,
            ToolError::InvalidArguments { .. } | ToolError::Encode { .. } => false,
        }
    }
}

/// Deserialize `args` into the tool's argument struct.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    // Agents frequently send `null` for argument-free tools.
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Serialize a tool response.
pub fn to_json<T: serde::Serialize>(tool: &str, response: &T) -> Result<Value, ToolError> {
    serde_json::to_value(response).map_err(|e| ToolError::Encode {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// BaseTool trait
// ---------------------------------------------------------------------------

/// A named, self-describing operation an agent can call with JSON arguments.
#[async_trait]
pub trait BaseTool: Send + Sync + fmt::Debug {
    /// The unique name of the tool.
    fn name(&self) -> &str;

    /// Description used to tell the model how and when to use the tool.
    fn description(&self) -> &str;

    /// JSON schema for the arguments that the tool accepts.
    fn args_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Number of successful runs so far.
    fn current_usage_count(&self) -> u32;

    /// Synchronous execution of the tool.
    fn run(&self, args: Value) -> Result<Value, ToolError>;

    /// Asynchronous execution of the tool.
    ///
    /// Default implementation calls `run` synchronously.
    async fn arun(&self, args: Value) -> Result<Value, ToolError> {
        self.run(args)
    }

    /// Name, description, and schema in the shape agents expect.
    fn definition(&self) -> Value {
        serde_json::json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": self.args_schema(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tool struct (wraps a callable function)
// ---------------------------------------------------------------------------

pub type ToolFn = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

/// Box a closure as a [`ToolFn`].
pub fn tool_fn<F>(func: F) -> ToolFn
where
    F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Concrete tool that wraps a callable function.
pub struct Tool {
    tool_name: String,
    tool_description: String,
    tool_args_schema: Value,
    pub func: ToolFn,
    usage_count: AtomicU32,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.tool_name)
            .field("description", &self.tool_description)
            .field("current_usage_count", &self.current_usage_count())
            .finish()
    }
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: ToolFn) -> Self {
        Self {
            tool_name: name.into(),
            tool_description: description.into(),
            tool_args_schema: serde_json::json!({ "type": "object", "properties": {} }),
            func,
            usage_count: AtomicU32::new(0),
        }
    }

    /// Builder method to set the args schema.
    pub fn with_args_schema(mut self, schema: Value) -> Self {
        self.tool_args_schema = schema;
        self
    }
}

#[async_trait]
impl BaseTool for Tool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.tool_description
    }

    fn args_schema(&self) -> Value {
        self.tool_args_schema.clone()
    }

    fn current_usage_count(&self) -> u32 {
        self.usage_count.load(Ordering::Relaxed)
    }

    fn run(&self, args: Value) -> Result<Value, ToolError> {
        let result = (self.func)(args)?;
        self.usage_count.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct EchoArgs {
        text: String,
    }

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            "Echo the text back",
            tool_fn(|args| {
                let args: EchoArgs = parse_args("echo", args)?;
                Ok(Value::String(args.text))
            }),
        )
    }

    #[test]
    fn test_tool_run_counts_successes() {
        let tool = echo_tool();
        assert_eq!(tool.run(serde_json::json!({"text": "hi"})).unwrap(), "hi");
        assert!(tool.run(serde_json::json!({})).is_err());
        assert_eq!(tool.current_usage_count(), 1);
    }

    #[test]
    fn test_arun_delegates_to_run() {
        let tool = echo_tool();
        let out = tokio_test::block_on(tool.arun(serde_json::json!({"text": "async"}))).unwrap();
        assert_eq!(out, "async");
    }

    #[test]
    fn test_invalid_arguments_error() {
        let err = parse_args::<EchoArgs>("echo", serde_json::json!({"text": 3})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "echo"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_definition_shape() {
        let tool = echo_tool().with_args_schema(serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        }));
        let def = tool.definition();
        assert_eq!(def["name"], "echo");
        assert_eq!(def["parameters"]["required"][0], "text");
    }
}
