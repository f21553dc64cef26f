use std::io;
use std::path::Path;

use anyhow::Result;
use chat_stream::{ChatSession, SessionConfig, SubmitOptions};
use cliclack::{input, intro, outro};
use console::style;

use crate::commands::drive_turn;
use crate::render::Renderer;
use crate::scripts::{list_scripts, transport_from};

/// Interactive loop. Every submission is answered by the next script(s) in
/// `script_dir`, in file-name order.
pub async fn handle_chat(script_dir: &Path, chunk_size: usize, config: SessionConfig) -> Result<()> {
    let scripts = list_scripts(script_dir)?;
    if scripts.is_empty() {
        anyhow::bail!("No .stream scripts found in {}", script_dir.display());
    }

    let transport = transport_from(&scripts, chunk_size)?;
    let session = ChatSession::new(transport, config);
    let mut renderer = Renderer::new(io::stdout());

    intro(style(" chat-stream ").on_cyan().black())?;
    println!(
        "Replaying {} script(s). Type {} to leave, Ctrl-C cancels a turn.",
        scripts.len(),
        style("exit").dim()
    );

    while session.transport().remaining() > 0 {
        let line: String = input("Message")
            .placeholder("What's the weather in San Francisco?")
            .interact()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }

        match drive_turn(&session, &mut renderer, line, SubmitOptions::default()).await? {
            Ok(()) => {}
            Err(error) => tracing::debug!(error = %error, "turn ended with an error"),
        }
    }

    outro(format!("{} message(s) in the conversation", session.messages().len()))?;
    Ok(())
}
