//! `ponder ask`: run one query and stream the agent's steps.

use super::{LoopArgs, Printer, build_agent};
use futures::StreamExt;
use ponder_agent::{AgentEvent, char_frames};
use std::time::Duration;

const TYPEWRITER_DELAY: Duration = Duration::from_millis(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Plain,
    Typewriter,
    Json,
    Quiet,
}

pub async fn run(query: &str, loop_args: &LoopArgs, output: Output) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent) = build_agent(loop_args)?;

    if output == Output::Quiet {
        let answer = agent.invoke(query).await?;
        println!("{answer}");
        return Ok(());
    }

    if output == Output::Plain {
        eprintln!(
            "  Provider: {}  Model: {}  Reasoning: {}",
            config.default_provider,
            ponder_providers::default_model(&config),
            agent.settings().reasoning
        );
    }

    let events = agent.stream(query);
    let mut events = if output == Output::Typewriter {
        char_frames(events).boxed()
    } else {
        events.boxed()
    };

    let mut printer = Printer::new(std::io::stdout(), output == Output::Typewriter);
    let mut failure = None;

    while let Some(event) = events.next().await {
        if let AgentEvent::Error { kind, content } = &event {
            failure = Some(format!("{kind}: {content}"));
        }
        match output {
            Output::Json => println!("{}", serde_json::to_string(&event)?),
            Output::Typewriter => {
                printer.print(&event)?;
                if matches!(event, AgentEvent::Observation { .. } | AgentEvent::FinalAnswer { .. }) {
                    tokio::time::sleep(TYPEWRITER_DELAY).await;
                }
            }
            _ => printer.print(&event)?,
        }
    }
    printer.close()?;

    match failure {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}
