pub mod chat;
pub mod replay;

use std::io::Write;

use anyhow::Result;
use chat_stream::transport::ChatTransport;
use chat_stream::{ChatResult, ChatSession, SubmitOptions};

use crate::render::Renderer;

/// Submit `input` and render every published snapshot until the turn ends.
/// Ctrl-C cancels the turn instead of exiting.
///
/// The outer result carries terminal failures, the inner one the turn's outcome.
pub async fn drive_turn<T: ChatTransport, W: Write>(
    session: &ChatSession<T>,
    renderer: &mut Renderer<W>,
    input: &str,
    options: SubmitOptions,
) -> Result<ChatResult<()>> {
    let mut updates = session.subscribe();
    let submit = session.submit(input, options);
    tokio::pin!(submit);

    loop {
        tokio::select! {
            outcome = &mut submit => {
                let snapshot = updates.borrow_and_update().clone();
                renderer.render(&snapshot)?;
                return Ok(outcome);
            }
            changed = updates.changed() => {
                if changed.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    renderer.render(&snapshot)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupt received, cancelling turn");
                session.cancel();
            }
        }
    }
}
