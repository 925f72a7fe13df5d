//! Subcommands and the pieces they share: agent construction and event
//! rendering.

pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod tools;

use clap::Args;
use ponder_agent::{AgentEvent, ReactAgent};
use ponder_config::{AppConfig, ReasoningPolicy};
use std::io::Write;
use std::sync::Arc;

/// Loop overrides shared by `ask` and `chat`.
#[derive(Args, Debug, Clone, Default)]
pub struct LoopArgs {
    /// Let the model skip thoughts (sparse reasoning)
    #[arg(long)]
    pub sparse: bool,

    /// Override the iteration budget
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,
}

impl LoopArgs {
    pub fn apply(&self, agent: ReactAgent) -> ReactAgent {
        let agent = if self.sparse {
            agent.with_reasoning(ReasoningPolicy::Sparse)
        } else {
            agent
        };
        match self.max_iterations {
            Some(max) => agent.with_max_iterations(max.max(1)),
            None => agent,
        }
    }
}

/// Load the config and wire provider, tools and loop settings together.
pub fn build_agent(loop_args: &LoopArgs) -> Result<(AppConfig, ReactAgent), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early, local servers excepted
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export GROQ_API_KEY='gsk_...'           (default provider)");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-...'");
        eprintln!("    export PONDER_API_KEY='...'             (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = ponder_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;
    let tools = Arc::new(ponder_tools::default_registry(&config.tools));
    let model = ponder_providers::default_model(&config);

    let agent = loop_args.apply(ReactAgent::from_config(provider, tools, model, &config));
    Ok((config, agent))
}

/// Renders events as labelled terminal lines.
///
/// In framed mode, consecutive one-character `observation` or
/// `final_answer` events are joined onto a single line.
pub struct Printer<W: Write> {
    out: W,
    framed: bool,
    open: Option<&'static str>,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, framed: bool) -> Self {
        Self {
            out,
            framed,
            open: None,
        }
    }

    pub fn print(&mut self, event: &AgentEvent) -> std::io::Result<()> {
        let kind = event.event_type();
        let continues_frame = self.framed
            && matches!(event, AgentEvent::Observation { .. } | AgentEvent::FinalAnswer { .. });

        if continues_frame {
            if self.open != Some(kind) {
                self.close()?;
                write!(self.out, "{}", label(event))?;
                self.open = Some(kind);
            }
            write!(self.out, "{}", event.content())?;
            return self.out.flush();
        }

        self.close()?;
        writeln!(self.out, "{}{}", label(event), event.content())?;
        self.out.flush()
    }

    /// End a pending framed line.
    pub fn close(&mut self) -> std::io::Result<()> {
        if self.open.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn label(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Info { .. } => "  · ".into(),
        AgentEvent::Reasoning { .. } => "  Thought: ".into(),
        AgentEvent::ActionProposed { .. } => "  ".into(),
        AgentEvent::Observation { .. } => "  Observation: ".into(),
        AgentEvent::FinalAnswer { .. } => "\n  Final Answer: ".into(),
        AgentEvent::Error { kind, .. } => format!("  [Error: {kind}] "),
    }
}
