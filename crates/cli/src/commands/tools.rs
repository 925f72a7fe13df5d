//! `ponder tools`: the tool catalogue as the model sees it.

use ponder_agent::prompt::system_prompt;
use ponder_config::{AppConfig, ReasoningPolicy};

pub fn run(full_prompt: bool, sparse: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = ponder_tools::default_registry(&config.tools);

    if full_prompt {
        let policy = if sparse { ReasoningPolicy::Sparse } else { config.agent.reasoning };
        let prompt = match &config.agent.system_prompt {
            Some(custom) => custom.clone(),
            None => system_prompt(&registry, policy),
        };
        println!("{prompt}");
        return Ok(());
    }

    println!("{} tools available:", registry.len());
    println!();
    for line in registry.catalogue().lines() {
        println!("  - {line}");
    }
    Ok(())
}
