//! Configuration loading, validation, and management for Ponder.
//!
//! Loads configuration from `~/.ponder/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ponder/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "groq".into()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// How strictly each model turn must follow the Thought/Action format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPolicy {
    /// Every turn carries both a thought and an action.
    #[default]
    Dense,
    /// A turn carries a thought, an action, or both.
    Sparse,
}

impl std::fmt::Display for ReasoningPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dense => write!(f, "dense"),
            Self::Sparse => write!(f, "sparse"),
        }
    }
}

/// Which model turns are kept in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRetention {
    /// Reasoning-only turns are appended like any other.
    #[default]
    RetainAll,
    /// Reasoning-only turns are dropped from the context.
    ActionsOnly,
}

/// What happens when a model turn violates the format contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// The violation is fatal.
    #[default]
    None,
    /// Ask the model once to reformat its last turn.
    Reprompt,
    /// Treat the turn (or the last successful observation) as the answer.
    ForceFinish,
}

/// What happens when a dispatched tool fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorPolicy {
    /// The failure ends the run.
    #[default]
    Fatal,
    /// The failure is fed back to the model as an observation.
    Observe,
}

/// Agent control loop settings (`[agent]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default)]
    pub reasoning: ReasoningPolicy,

    /// Number of recent actions the loop guard remembers
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    #[serde(default)]
    pub history: HistoryRetention,

    #[serde(default)]
    pub repair: RepairStrategy,

    #[serde(default)]
    pub tool_errors: ToolErrorPolicy,

    /// Failures tolerated per query under the `observe` policy
    #[serde(default = "default_max_tool_failures")]
    pub max_tool_failures: usize,

    /// Use the provider's streaming endpoint for model calls
    #[serde(default)]
    pub stream_model: bool,

    /// Stop sequences sent with every model request
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,

    /// Replace the built system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> usize {
    7
}
fn default_loop_window() -> usize {
    3
}
fn default_max_tool_failures() -> usize {
    2
}
fn default_stop() -> Vec<String> {
    vec!["\nObservation:".into()]
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            reasoning: ReasoningPolicy::default(),
            loop_window: default_loop_window(),
            history: HistoryRetention::default(),
            repair: RepairStrategy::default(),
            tool_errors: ToolErrorPolicy::default(),
            max_tool_failures: default_max_tool_failures(),
            stream_model: false,
            stop: default_stop(),
            system_prompt: None,
        }
    }
}

/// Built-in tool settings (`[tools]`).
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Base commands the shell tool may run. Empty = all allowed.
    #[serde(default)]
    pub shell_allowlist: Vec<String>,

    /// Characters returned by a file read before truncation
    #[serde(default = "default_read_limit")]
    pub file_read_limit: usize,

    /// Entries returned by a directory listing before truncation
    #[serde(default = "default_list_limit")]
    pub file_list_limit: usize,

    #[serde(default = "default_search_results")]
    pub search_results: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,

    /// Google Custom Search engine ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cse_id: Option<String>,
}

fn default_shell_timeout() -> u64 {
    10
}
fn default_read_limit() -> usize {
    10_000
}
fn default_list_limit() -> usize {
    100
}
fn default_search_results() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            shell_allowlist: vec![],
            file_read_limit: default_read_limit(),
            file_list_limit: default_list_limit(),
            search_results: default_search_results(),
            google_api_key: None,
            google_cse_id: None,
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("shell_timeout_secs", &self.shell_timeout_secs)
            .field("shell_allowlist", &self.shell_allowlist)
            .field("file_read_limit", &self.file_read_limit)
            .field("file_list_limit", &self.file_list_limit)
            .field("search_results", &self.search_results)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("google_cse_id", &self.google_cse_id)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ponder/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `PONDER_API_KEY` (highest priority)
    /// - `GROQ_API_KEY`
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides through the given lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PONDER_API_KEY")
                .or_else(|| lookup("GROQ_API_KEY"))
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("PONDER_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("PONDER_MODEL") {
            self.default_model = model;
        }

        if self.tools.google_api_key.is_none() {
            self.tools.google_api_key = lookup("GOOGLE_API_KEY");
        }
        if self.tools.google_cse_id.is_none() {
            self.tools.google_cse_id = lookup("GOOGLE_CSE_ID");
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ponder")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.loop_window == 0 {
            return Err(ConfigError::ValidationError(
                "agent.loop_window must be at least 1".into(),
            ));
        }

        if self.tools.shell_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.shell_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config --default`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            tools: ToolsConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
