use std::collections::HashMap;
use std::io::{self, Write};

use chat_stream::models::message::Message;
use chat_stream::models::part::{Part, ToolInvocation};
use chat_stream::models::role::Role;
use chat_stream::{ChatStatus, SessionSnapshot};
use console::style;

#[derive(Default)]
struct MessageProgress {
    // bytes already written, keyed by part index
    text_written: HashMap<usize, usize>,
    // tool call id -> whether its result has been written
    tools: HashMap<String, bool>,
}

/// Writes each snapshot's new content to a terminal.
///
/// Snapshots only ever grow: text parts get longer and tool invocations gain
/// results. The renderer remembers what it already wrote and emits the rest.
pub struct Renderer<W: Write> {
    out: W,
    progress: HashMap<String, MessageProgress>,
    status: ChatStatus,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Renderer {
            out,
            progress: HashMap::new(),
            status: ChatStatus::Idle,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        for message in &snapshot.messages {
            self.render_message(message)?;
        }

        if snapshot.status != self.status {
            self.render_status(snapshot)?;
            self.status = snapshot.status;
        }
        self.out.flush()
    }

    fn render_message(&mut self, message: &Message) -> io::Result<()> {
        let is_new = !self.progress.contains_key(&message.id);
        let progress = self.progress.entry(message.id.clone()).or_default();

        if is_new {
            let label = format!("{}: ", message.role);
            let label = match message.role {
                Role::User => style(label).green().bold(),
                Role::Assistant => style(label).cyan().bold(),
                Role::System | Role::Tool => style(label).dim(),
            };
            write!(self.out, "\n{}", label)?;
        }

        for (index, part) in message.parts.iter().enumerate() {
            match part {
                Part::Text(text) => {
                    let written = progress.text_written.entry(index).or_insert(0);
                    if text.text.len() > *written {
                        write!(self.out, "{}", &text.text[*written..])?;
                        *written = text.text.len();
                    }
                }
                Part::ToolInvocation { tool_invocation } => {
                    render_tool(&mut self.out, progress, tool_invocation)?;
                }
            }
        }
        Ok(())
    }

    fn render_status(&mut self, snapshot: &SessionSnapshot) -> io::Result<()> {
        match snapshot.status {
            ChatStatus::Error => {
                let reason = snapshot
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string());
                writeln!(self.out, "\n{} {}", style("error:").red().bold(), style(reason).red())
            }
            ChatStatus::Ready => {
                // calls that never got a result still show their final args
                for message in &snapshot.messages {
                    let Some(progress) = self.progress.get_mut(&message.id) else {
                        continue;
                    };
                    for invocation in message.tool_invocations() {
                        if progress.tools.get(&invocation.tool_call_id) == Some(&false) {
                            write_args(&mut self.out, invocation)?;
                            writeln!(self.out, "  {}", style("(no result)").dim())?;
                            progress.tools.insert(invocation.tool_call_id.clone(), true);
                        }
                    }
                }
                writeln!(self.out)
            }
            ChatStatus::Idle | ChatStatus::Submitted | ChatStatus::Streaming => Ok(()),
        }
    }
}

fn render_tool<W: Write>(
    out: &mut W,
    progress: &mut MessageProgress,
    invocation: &ToolInvocation,
) -> io::Result<()> {
    let done = match progress.tools.get(&invocation.tool_call_id) {
        Some(done) => *done,
        None => {
            write!(
                out,
                "\n{}",
                style(format!("STEP #{}:", invocation.step + 1)).bold()
            )?;
            progress.tools.insert(invocation.tool_call_id.clone(), false);
            false
        }
    };

    if done || !invocation.is_resolved() {
        return Ok(());
    }

    write_args(out, invocation)?;
    if let Some(result) = &invocation.result {
        writeln!(out, "  {} {}", style("=>").dim(), style(result).green())?;
    }
    progress.tools.insert(invocation.tool_call_id.clone(), true);
    Ok(())
}

fn write_args<W: Write>(out: &mut W, invocation: &ToolInvocation) -> io::Result<()> {
    let args = serde_json::to_string_pretty(&invocation.args).unwrap_or_else(|_| "{}".to_string());
    writeln!(out, "\n{}({})", style(&invocation.tool_name).magenta(), args)
}
