//! Errors that end a ReAct run.
//!
//! Every fatal condition the loop can hit is an [`AgentError`]. The stream
//! surfaces it as a single `error` event tagged with its [`ErrorKind`];
//! `invoke` returns it directly.

use ponder_config::ReasoningPolicy;
use ponder_core::error::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminator carried by `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FormatViolation,
    ToolNotFound,
    ToolExecutionFailed,
    LoopDetected,
    IterationsExhausted,
    ModelFailed,
    /// Only produced by the blocking wrappers, never by the loop itself.
    Runtime,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormatViolation => "format_violation",
            Self::ToolNotFound => "tool_not_found",
            Self::ToolExecutionFailed => "tool_execution_failed",
            Self::LoopDetected => "loop_detected",
            Self::IterationsExhausted => "iterations_exhausted",
            Self::ModelFailed => "model_failed",
            Self::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Model output did not follow the {policy} ReAct format. Output:\n{output}")]
    FormatViolation {
        policy: ReasoningPolicy,
        output: String,
    },

    #[error("Tool '{name}' is not recognized. Available tools: {list}", list = .available.join(", "))]
    ToolNotFound { name: String, available: Vec<String> },

    #[error("Error executing tool '{tool}' with input '{argument}': {reason}")]
    ToolExecutionFailed {
        tool: String,
        argument: String,
        reason: String,
    },

    #[error("Loop detected at iteration {iteration}: repeated action '{name}[{argument}]'")]
    LoopDetected {
        name: String,
        argument: String,
        iteration: usize,
    },

    #[error("Max iterations ({budget}) reached without a final answer")]
    IterationsExhausted { budget: usize },

    #[error("Model call failed: {0}")]
    ModelFailed(#[from] ProviderError),

    #[error("Could not start the async runtime: {0}")]
    Runtime(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FormatViolation { .. } => ErrorKind::FormatViolation,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::ToolExecutionFailed { .. } => ErrorKind::ToolExecutionFailed,
            Self::LoopDetected { .. } => ErrorKind::LoopDetected,
            Self::IterationsExhausted { .. } => ErrorKind::IterationsExhausted,
            Self::ModelFailed(_) => ErrorKind::ModelFailed,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }
}
