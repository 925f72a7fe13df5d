//! Built-in tool implementations for Ponder.
//!
//! Tools give the agent the ability to interact with the world:
//! do arithmetic, run shell commands, search the web, and manage files.

pub mod calculator;
pub mod file_manager;
pub mod google_search;
pub mod shell;

use ponder_config::ToolsConfig;
use ponder_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use file_manager::FileManagerTool;
pub use google_search::GoogleSearchTool;
pub use shell::ShellTool;

/// Create a tool registry with all built-in tools.
///
/// `finish` is injected by the registry itself.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(shell::ShellTool::new(
        config.shell_allowlist.clone(),
        config.shell_timeout_secs,
    )));
    registry.register(Box::new(google_search::GoogleSearchTool::new(
        config.google_api_key.clone(),
        config.google_cse_id.clone(),
        config.search_results,
    )));
    registry.register_blocking(file_manager::FileManagerTool::new(
        config.file_read_limit,
        config.file_list_limit,
    ));
    registry
}
