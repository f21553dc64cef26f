use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod configuration;
mod error;
mod render;
mod scripts;

use commands::chat::handle_chat;
use commands::replay::{handle_replay, ReplayOptions};
use configuration::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file, layered under CHAT_STREAM_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the step limit per turn
    #[arg(long, global = true)]
    max_steps: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay recorded data-stream responses for a single submission
    Replay {
        /// Response scripts, consumed one per step
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        /// The user message to submit
        #[arg(short, long, default_value = "What's the weather in San Francisco?")]
        input: String,

        /// Extra data sent with the request, as JSON
        #[arg(long)]
        data: Option<String>,

        /// Extra body fields merged into the request, as a JSON object
        #[arg(long)]
        body: Option<String>,

        /// Print the final session snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat answered from a directory of scripts
    Chat {
        /// Directory of .stream scripts (defaults to replay.script_dir)
        #[arg(long)]
        script_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(max_steps) = cli.max_steps {
        settings.session.max_steps = max_steps;
    }

    match cli.command {
        Command::Replay {
            scripts,
            input,
            data,
            body,
            json,
        } => {
            let options = ReplayOptions {
                scripts,
                input,
                data,
                body,
                chunk_size: settings.replay.chunk_size,
                json,
            };
            handle_replay(options, settings.session).await
        }
        Command::Chat { script_dir } => {
            let script_dir = script_dir
                .or(settings.replay.script_dir)
                .context("No script directory: pass --script-dir or set CHAT_STREAM_REPLAY__SCRIPT_DIR")?;
            handle_chat(&script_dir, settings.replay.chunk_size, settings.session).await
        }
    }
}
