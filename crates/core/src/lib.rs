//! # Ponder Core
//!
//! Domain types, traits, and error definitions for the Ponder ReAct agent runtime.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two collaborators of the agent loop, model providers and tools, are
//! defined as traits here. Implementations live in their respective crates,
//! so tests can swap in scripted mocks and every crate depends inward on core.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{
    Blocking, BlockingTool, FINISH_TOOL, FinishTool, Tool, ToolRegistry, ToolResult,
    string_argument,
};
