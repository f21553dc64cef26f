use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_stream::{ChatSession, SessionConfig, SubmitOptions};
use serde_json::Value;

use crate::commands::drive_turn;
use crate::render::Renderer;
use crate::scripts::transport_from;

pub struct ReplayOptions {
    pub scripts: Vec<PathBuf>,
    pub input: String,
    pub data: Option<String>,
    pub body: Option<String>,
    pub chunk_size: usize,
    pub json: bool,
}

/// One submission answered by the given scripts, one per step
pub async fn handle_replay(options: ReplayOptions, config: SessionConfig) -> Result<()> {
    let transport = transport_from(&options.scripts, options.chunk_size)?;
    let session = ChatSession::new(transport, config);

    let mut submit = SubmitOptions::default();
    if let Some(data) = &options.data {
        let data: Value = serde_json::from_str(data).context("--data must be valid JSON")?;
        submit = submit.with_data(data);
    }
    if let Some(body) = &options.body {
        let body: serde_json::Map<String, Value> =
            serde_json::from_str(body).context("--body must be a JSON object")?;
        submit = submit.with_body(body);
    }

    let mut renderer = Renderer::new(io::stdout());
    let outcome = drive_turn(&session, &mut renderer, &options.input, submit).await?;

    let left = session.transport().remaining();
    if left > 0 {
        tracing::warn!(left, "turn ended before every script was used");
    }

    if options.json {
        let snapshot = session.snapshot();
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    }

    outcome.context("turn failed")
}
