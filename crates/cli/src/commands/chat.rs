//! `ponder chat`: interactive session.

use super::{LoopArgs, Printer, build_agent};
use ponder_core::message::Conversation;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(loop_args: &LoopArgs, remember: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, agent) = build_agent(loop_args)?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Ponder: Interactive ReAct           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", ponder_providers::default_model(&config));
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!("  Reasoning: {}", agent.settings().reasoning);
    println!("  Memory:    {}", if remember { "conversation kept" } else { "fresh per query" });
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'quit' or press Ctrl+D to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation: Option<Conversation> = None;

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "quit" | "exit") {
            break;
        }

        let mut run = match conversation.take() {
            Some(previous) if remember => agent.resume(previous, query),
            _ => agent.start(query),
        };

        println!();
        let mut printer = Printer::new(std::io::stdout(), false);
        while let Some(event) = run.next_event().await {
            printer.print(&event)?;
        }
        printer.close()?;
        println!();

        if remember {
            conversation = Some(run.into_conversation());
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
