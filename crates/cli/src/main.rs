//! Ponder CLI: the main entry point.
//!
//! Commands:
//! - `ask`:    Run one query and stream the agent's steps
//! - `chat`:   Interactive session
//! - `tools`:  Show the tool catalogue the model sees
//! - `config`: Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ponder",
    about = "Ponder: a ReAct agent that thinks, acts and observes",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query
    Ask {
        /// The question or task
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[command(flatten)]
        loop_args: commands::LoopArgs,

        /// Print observations and the answer one character at a time
        #[arg(long)]
        typewriter: bool,

        /// Print events as JSON lines
        #[arg(long, conflicts_with = "typewriter")]
        json: bool,

        /// Print only the final answer
        #[arg(short, long, conflicts_with_all = ["typewriter", "json"])]
        quiet: bool,
    },

    /// Interactive session
    Chat {
        #[command(flatten)]
        loop_args: commands::LoopArgs,

        /// Keep the conversation across queries
        #[arg(long)]
        remember: bool,
    },

    /// Show the tool catalogue
    Tools {
        /// Print the whole system prompt instead
        #[arg(long)]
        prompt: bool,

        /// Use the sparse prompt with --prompt
        #[arg(long)]
        sparse: bool,
    },

    /// Show the effective configuration
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,

        /// Print the config file path
        #[arg(long, conflicts_with = "default")]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            query,
            loop_args,
            typewriter,
            json,
            quiet,
        } => {
            let output = if quiet {
                commands::ask::Output::Quiet
            } else if json {
                commands::ask::Output::Json
            } else if typewriter {
                commands::ask::Output::Typewriter
            } else {
                commands::ask::Output::Plain
            };
            commands::ask::run(&query.join(" "), &loop_args, output).await?
        }
        Commands::Chat { loop_args, remember } => commands::chat::run(&loop_args, remember).await?,
        Commands::Tools { prompt, sparse } => commands::tools::run(prompt, sparse)?,
        Commands::Config { default, path } => {
            if path {
                commands::config_cmd::path()?
            } else {
                commands::config_cmd::show(default)?
            }
        }
    }

    Ok(())
}
