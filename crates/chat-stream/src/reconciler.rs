use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::assembler::PartAssembler;
use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::models::part::Part;
use crate::models::role::Role;
use crate::protocol::Frame;
use crate::steps::StepController;

/// The assistant message currently receiving frames
#[derive(Debug)]
struct InFlight {
    id: String,
    created_at: DateTime<Utc>,
    annotations: Vec<Value>,
    assembler: PartAssembler,
}

impl InFlight {
    fn new(message: &Message) -> Self {
        InFlight {
            id: message.id.clone(),
            created_at: message.created_at,
            annotations: Vec::new(),
            assembler: PartAssembler::new(),
        }
    }

    fn to_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            role: Role::Assistant,
            created_at: self.created_at,
            parts: self.assembler.parts().to_vec(),
            annotations: self.annotations.clone(),
        }
    }
}

/// Owns the authoritative message list.
///
/// Messages are held as shared snapshots. Finalized messages are never touched
/// again; the in-flight message, always the last one, is replaced by a fresh
/// snapshot after every applied frame.
#[derive(Debug, Default)]
pub struct MessageReconciler {
    messages: Vec<Arc<Message>>,
    in_flight: Option<InFlight>,
}

impl MessageReconciler {
    pub fn new(initial: Vec<Message>) -> Self {
        MessageReconciler {
            messages: initial.into_iter().map(Arc::new).collect(),
            in_flight: None,
        }
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Messages to send as history: everything except the in-flight placeholder
    pub fn history(&self) -> Vec<Message> {
        let finalized = match self.in_flight {
            Some(_) => &self.messages[..self.messages.len().saturating_sub(1)],
            None => &self.messages[..],
        };
        finalized.iter().map(|message| (**message).clone()).collect()
    }

    pub fn in_flight_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|in_flight| in_flight.id.as_str())
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Parts of the newest assistant message, in flight or not
    pub fn last_assistant_parts(&self) -> &[Part] {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.parts.as_slice())
            .unwrap_or_default()
    }

    /// Record the user's message and open an empty assistant message for the reply
    pub fn begin_turn(&mut self, user_message: Message) -> ChatResult<()> {
        self.ensure_idle()?;
        self.messages.push(Arc::new(user_message));
        self.open_assistant()
    }

    /// Open a fresh assistant placeholder, used for automatic continuation too
    pub fn open_assistant(&mut self) -> ChatResult<()> {
        self.ensure_idle()?;
        let placeholder = Message::assistant();
        self.in_flight = Some(InFlight::new(&placeholder));
        self.messages.push(Arc::new(placeholder));
        Ok(())
    }

    /// Replace the whole list. Only allowed between turns.
    pub fn set_messages(&mut self, messages: Vec<Message>) -> ChatResult<()> {
        self.ensure_idle()?;
        self.messages = messages.into_iter().map(Arc::new).collect();
        Ok(())
    }

    /// Apply one frame to the in-flight message.
    ///
    /// `custom-data` frames never touch messages and are ignored here. An
    /// `error` frame finalizes the message and comes back as
    /// [`ChatError::Stream`]. Any other frame arriving when no message is in
    /// flight is an integrity violation.
    pub fn apply(&mut self, frame: &Frame, steps: &mut StepController) -> ChatResult<()> {
        if let Frame::CustomData { .. } = frame {
            return Ok(());
        }
        if let Frame::Error { message } = frame {
            self.finalize();
            return Err(ChatError::Stream(message.clone()));
        }

        let Some(in_flight) = self.in_flight.as_mut() else {
            tracing::warn!(kind = frame.kind(), "frame after message was finalized");
            return Err(ChatError::AssemblerIntegrity(format!(
                "{} frame arrived after the message was finalized",
                frame.kind()
            )));
        };

        match frame {
            Frame::TextDelta { .. } | Frame::ToolCallDelta { .. } => {
                in_flight.assembler.apply(frame, steps.current_step())?;
            }
            Frame::ToolCallStart { tool_call_id, step, .. } => {
                let step = steps.step_for_tool_call(*step);
                tracing::debug!(tool_call_id = %tool_call_id, step, "tool call started");
                in_flight.assembler.apply(frame, step)?;
            }
            Frame::ToolCall { tool_call_id, .. } => {
                let streaming = in_flight
                    .assembler
                    .parts()
                    .last()
                    .and_then(Part::as_tool_invocation)
                    .is_some_and(|invocation| &invocation.tool_call_id == tool_call_id)
                    && in_flight.assembler.has_open_part();
                let step = if streaming {
                    steps.current_step()
                } else {
                    steps.step_for_tool_call(None)
                };
                in_flight.assembler.apply(frame, step)?;
            }
            Frame::ToolResult { .. } => {
                in_flight.assembler.apply(frame, steps.current_step())?;
                steps.record_tool_result();
            }
            Frame::Annotations { payload } => {
                in_flight.annotations.extend(payload.iter().cloned());
            }
            Frame::FinishStep { is_continued, .. } => {
                if !is_continued {
                    in_flight.assembler.close_open_part();
                }
                steps.finish_step();
            }
            Frame::StartStep { message_id } => {
                tracing::debug!(message_id = %message_id, "server started a step");
            }
            Frame::Finish { reason, .. } => {
                tracing::debug!(reason = ?reason, "message finished");
                self.finalize();
                return Ok(());
            }
            Frame::CustomData { .. } | Frame::Error { .. } => {}
        }

        self.publish_in_flight();
        Ok(())
    }

    /// Close the in-flight message, keeping whatever parts it accumulated
    pub fn finalize(&mut self) {
        if self.in_flight.take().is_some() {
            tracing::trace!("in-flight message finalized");
        }
    }

    fn publish_in_flight(&mut self) {
        let Some(in_flight) = &self.in_flight else {
            return;
        };
        let snapshot = Arc::new(in_flight.to_message());
        if let Some(last) = self.messages.last_mut() {
            *last = snapshot;
        }
    }

    fn ensure_idle(&self) -> ChatResult<()> {
        if self.in_flight.is_some() {
            return Err(ChatError::InvalidState(
                "a message is still in flight".to_string(),
            ));
        }
        Ok(())
    }
}
