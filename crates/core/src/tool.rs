//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! run shell commands, manage files, search the web, do arithmetic.
//! Async tools implement [`Tool`]; synchronous ones implement
//! [`BlockingTool`] and are moved onto tokio's blocking pool when invoked.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the reserved completion tool.
pub const FINISH_TOOL: &str = "finish";

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content, fed back to the model as the observation
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    /// A failed outcome that is still a valid observation for the model.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }
}

/// The core Tool trait.
///
/// Each tool (calculate, run_shell_command, google_search, file_manager)
/// implements this trait. Tools are registered in the [`ToolRegistry`] and
/// made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculate").
    fn name(&self) -> &str;

    /// A description of what this tool does (injected into the system prompt).
    fn description(&self) -> &str;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// A tool whose work is synchronous (filesystem, CPU-bound).
pub trait BlockingTool: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn run(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// Adapts a [`BlockingTool`] to the async [`Tool`] trait.
pub struct Blocking<T: BlockingTool>(Arc<T>);

impl<T: BlockingTool> Blocking<T> {
    pub fn new(tool: T) -> Self {
        Self(Arc::new(tool))
    }
}

#[async_trait]
impl<T: BlockingTool> Tool for Blocking<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.0.clone();
        tokio::task::spawn_blocking(move || tool.run(arguments))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.0.name().to_string(),
                reason: if e.is_panic() {
                    "tool panicked".into()
                } else {
                    format!("blocking task failed: {e}")
                },
            })?
    }
}

/// The reserved completion tool. The agent loop intercepts it, so
/// `execute` only ever echoes its input back.
pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        FINISH_TOOL
    }

    fn description(&self) -> &str {
        "Returns the final answer to the user and finishes the task. \
         Use it once you know the answer, e.g. finish[42]."
    }

    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(string_argument(&arguments, "input").unwrap_or_default()))
    }
}

/// Pull a string argument out of a tool input.
///
/// Accepts a bare JSON string, `{key: "..."}`, or `{"input": "..."}`.
pub fn string_argument(arguments: &serde_json::Value, key: &str) -> Option<String> {
    match arguments {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get(key)
            .or_else(|| map.get("input"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Build the tool catalogue sent to the model
/// 2. Look up and execute tools when the model requests them
///
/// The `finish` tool is always present. The registry is read-only once
/// handed to an agent; share it behind an `Arc`.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut tools: BTreeMap<String, Arc<dyn Tool>> = BTreeMap::new();
        tools.insert(FINISH_TOOL.to_string(), Arc::new(FinishTool));
        Self { tools }
    }

    /// Register a tool. Replaces any existing tool with the same name,
    /// except the reserved `finish`.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if name.eq_ignore_ascii_case(FINISH_TOOL) {
            tracing::warn!(tool = %name, "Ignoring registration of reserved tool name");
            return;
        }
        if self.tools.insert(name.clone(), Arc::from(tool)).is_some() {
            tracing::debug!(tool = %name, "Replaced existing tool");
        }
    }

    /// Register a synchronous tool.
    pub fn register_blocking<T: BlockingTool>(&mut self, tool: T) {
        self.register(Box::new(Blocking::new(tool)));
    }

    /// Get a tool by name: exact match first, then ASCII case-insensitive.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .or_else(|| {
                self.tools
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, t)| t)
            })
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All registered tool names, `finish` last.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .keys()
            .filter(|k| k.as_str() != FINISH_TOOL)
            .cloned()
            .chain(std::iter::once(FINISH_TOOL.to_string()))
            .collect()
    }

    /// One `name: description` line per tool, `finish` last.
    pub fn catalogue(&self) -> String {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
