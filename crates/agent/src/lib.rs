//! The ReAct agent loop: the heart of Ponder.
//!
//! The agent follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Ask** the model for the next step, given the whole conversation
//! 2. **Parse** the free-form text into reasoning and at most one action
//! 3. **Guard** against the model repeating a recent action
//! 4. **Dispatch** the action to a registered tool
//! 5. **Observe**: append the tool output and loop back to step 1
//!
//! The loop ends when the model calls `finish`, or on the first fatal
//! condition (format violation, unknown tool, tool failure, repeated
//! action, exhausted budget, model failure). Progress is reported as a
//! stream of typed [`AgentEvent`]s.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod loop_guard;
pub mod parser;
pub mod prompt;
pub mod react;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{AgentError, ErrorKind};
pub use event::{AgentEvent, char_frames};
pub use loop_guard::{ActionSignature, LoopGuard, Verdict};
pub use parser::{ParseRule, ParsedStep, parse};
pub use react::{AgentRun, BlockingEvents, ReactAgent};
