//! Action dispatcher: resolves a parsed action against the tool registry
//! and runs it.
//!
//! The argument text is decoded as JSON when it parses, otherwise it is
//! handed to the tool as a JSON string. Tool errors and panics come back
//! as [`AgentError::ToolExecutionFailed`].

use crate::error::AgentError;
use futures::FutureExt;
use ponder_core::tool::{ToolRegistry, ToolResult};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// The outcome of one dispatched action.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The registered name of the tool that ran
    pub tool: String,
    pub result: ToolResult,
}

#[derive(Clone)]
pub struct Dispatcher {
    tools: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub async fn dispatch(&self, name: &str, argument: &str) -> Result<Dispatched, AgentError> {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return Err(AgentError::ToolNotFound {
                name: name.to_string(),
                available: self.tools.names(),
            });
        };

        let tool_name = tool.name().to_string();
        debug!(tool = %tool_name, argument = %argument, "Dispatching action");

        let outcome = AssertUnwindSafe(tool.execute(decode_argument(argument)))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => Ok(Dispatched {
                tool: tool_name,
                result,
            }),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed {
                tool: tool_name,
                argument: argument.to_string(),
                reason: e.to_string(),
            }),
            Err(panic) => Err(AgentError::ToolExecutionFailed {
                tool: tool_name,
                argument: argument.to_string(),
                reason: format!("tool panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}

/// JSON when the text parses as JSON, a JSON string otherwise.
pub fn decode_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// The answer carried by a `finish` action.
///
/// Accepts `{"input": "..."}`, a bare JSON string, or plain text.
pub fn decode_final_answer(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => match map.get("input") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
