use serde_json::Value;

use crate::errors::{ChatError, ChatResult};
use crate::models::part::{Part, ToolInvocation, ToolState};
use crate::protocol::{parse_partial_json, Frame};

/// The part that is still receiving deltas. Only ever the last part.
#[derive(Debug, Clone, PartialEq)]
enum OpenPart {
    Text,
    ToolArgs {
        tool_call_id: String,
        args_text: String,
    },
}

/// Folds content frames into the ordered part list of the in-flight message.
///
/// Every operation validates before it mutates, so a rejected frame leaves the
/// parts exactly as they were.
#[derive(Debug, Clone, Default)]
pub struct PartAssembler {
    parts: Vec<Part>,
    open: Option<OpenPart>,
}

impl PartAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Whether the last part is still accepting deltas
    pub fn has_open_part(&self) -> bool {
        self.open.is_some()
    }

    /// Apply a content frame. `step` stamps tool calls created by this frame.
    ///
    /// Frames that carry no part content are rejected; routing them is the
    /// reconciler's job.
    pub fn apply(&mut self, frame: &Frame, step: u32) -> ChatResult<()> {
        match frame {
            Frame::TextDelta { content } => {
                self.append_text(content);
                Ok(())
            }
            Frame::ToolCallStart {
                tool_call_id,
                tool_name,
                ..
            } => self.start_tool_call(tool_call_id, tool_name, step),
            Frame::ToolCallDelta {
                tool_call_id,
                args_text_delta,
            } => self.append_tool_args(tool_call_id, args_text_delta),
            Frame::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => self.complete_tool_call(tool_call_id, tool_name, args.clone(), step),
            Frame::ToolResult {
                tool_call_id,
                result,
            } => self.attach_result(tool_call_id, result.clone()),
            other => Err(ChatError::AssemblerIntegrity(format!(
                "{} frame carries no part content",
                other.kind()
            ))),
        }
    }

    pub fn append_text(&mut self, content: &str) {
        if self.open == Some(OpenPart::Text) {
            if let Some(Part::Text(part)) = self.parts.last_mut() {
                part.text.push_str(content);
                return;
            }
        }
        self.parts.push(Part::text(content));
        self.open = Some(OpenPart::Text);
    }

    pub fn start_tool_call(&mut self, tool_call_id: &str, tool_name: &str, step: u32) -> ChatResult<()> {
        if self.find_tool(tool_call_id).is_some() {
            return Err(ChatError::AssemblerIntegrity(format!(
                "tool call {} was already started",
                tool_call_id
            )));
        }
        self.parts
            .push(Part::tool_invocation(ToolInvocation::call(tool_call_id, tool_name, step)));
        self.open = Some(OpenPart::ToolArgs {
            tool_call_id: tool_call_id.to_string(),
            args_text: String::new(),
        });
        Ok(())
    }

    pub fn append_tool_args(&mut self, tool_call_id: &str, fragment: &str) -> ChatResult<()> {
        match self.open.as_mut() {
            Some(OpenPart::ToolArgs {
                tool_call_id: open_id,
                args_text,
            }) if open_id.as_str() == tool_call_id => {
                args_text.push_str(fragment);
                let parsed = parse_partial_json(args_text);
                if let (Some(args), Some(invocation)) = (
                    parsed,
                    self.parts.last_mut().and_then(Part::as_tool_invocation_mut),
                ) {
                    invocation.args = args;
                }
                Ok(())
            }
            _ => {
                let reason = if self.find_tool(tool_call_id).is_some() {
                    "is no longer receiving argument deltas"
                } else {
                    "is unknown"
                };
                Err(ChatError::AssemblerIntegrity(format!(
                    "tool call {} {}",
                    tool_call_id, reason
                )))
            }
        }
    }

    /// A complete call: closes a streaming call with the same id, or appends a new one
    pub fn complete_tool_call(
        &mut self,
        tool_call_id: &str,
        tool_name: &str,
        args: Value,
        step: u32,
    ) -> ChatResult<()> {
        let streaming = matches!(
            &self.open,
            Some(OpenPart::ToolArgs { tool_call_id: open_id, .. }) if open_id == tool_call_id
        );

        if streaming {
            if let Some(invocation) = self.parts.last_mut().and_then(Part::as_tool_invocation_mut) {
                invocation.args = args;
            }
            self.open = None;
            return Ok(());
        }

        if self.find_tool(tool_call_id).is_some() {
            return Err(ChatError::AssemblerIntegrity(format!(
                "tool call {} was already started",
                tool_call_id
            )));
        }

        self.parts.push(Part::tool_invocation(
            ToolInvocation::call(tool_call_id, tool_name, step).with_args(args),
        ));
        self.open = None;
        Ok(())
    }

    /// Transition the matching invocation from `call` to `result` in place
    pub fn attach_result(&mut self, tool_call_id: &str, result: Value) -> ChatResult<()> {
        let index = self.find_tool(tool_call_id).ok_or_else(|| {
            ChatError::AssemblerIntegrity(format!(
                "tool result for unknown tool call {}",
                tool_call_id
            ))
        })?;

        let closes_open_part = index + 1 == self.parts.len()
            && matches!(&self.open, Some(OpenPart::ToolArgs { .. }));

        let invocation = self.parts[index]
            .as_tool_invocation_mut()
            .ok_or_else(|| {
                ChatError::AssemblerIntegrity(format!("part for {} is not a tool call", tool_call_id))
            })?;

        if invocation.state != ToolState::Call {
            return Err(ChatError::AssemblerIntegrity(format!(
                "tool call {} already has a result",
                tool_call_id
            )));
        }

        invocation.state = ToolState::Result;
        invocation.result = Some(result);

        if closes_open_part {
            self.open = None;
        }
        Ok(())
    }

    /// Stop accepting deltas into the last part
    pub fn close_open_part(&mut self) {
        self.open = None;
    }

    fn find_tool(&self, tool_call_id: &str) -> Option<usize> {
        self.parts.iter().position(|part| {
            part.as_tool_invocation()
                .is_some_and(|invocation| invocation.tool_call_id == tool_call_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(content: &str) -> Frame {
        Frame::TextDelta {
            content: content.to_string(),
        }
    }

    fn start(id: &str, name: &str) -> Frame {
        Frame::ToolCallStart {
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
            step: None,
        }
    }

    fn delta(id: &str, fragment: &str) -> Frame {
        Frame::ToolCallDelta {
            tool_call_id: id.to_string(),
            args_text_delta: fragment.to_string(),
        }
    }

    fn result(id: &str, value: Value) -> Frame {
        Frame::ToolResult {
            tool_call_id: id.to_string(),
            result: value,
        }
    }

    #[test]
    fn test_text_deltas_concatenate() {
        let mut assembler = PartAssembler::new();
        for chunk in ["The ", "weather ", "is ", "", "sunny."] {
            assembler.apply(&text(chunk), 0).unwrap();
        }
        assert_eq!(assembler.parts(), &[Part::text("The weather is sunny.")]);
    }

    #[test]
    fn test_text_after_tool_call_starts_new_part() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&text("Let me check. "), 0).unwrap();
        assembler.apply(&start("c1", "getWeather"), 0).unwrap();
        assembler.apply(&text("It is sunny."), 0).unwrap();

        let parts = assembler.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_text(), Some("Let me check. "));
        assert_eq!(parts[1].as_tool_invocation().unwrap().tool_name, "getWeather");
        assert_eq!(parts[2].as_text(), Some("It is sunny."));
    }

    #[test]
    fn test_closed_text_is_not_extended() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&text("first"), 0).unwrap();
        assembler.close_open_part();
        assembler.apply(&text("second"), 0).unwrap();
        assert_eq!(
            assembler.parts(),
            &[Part::text("first"), Part::text("second")]
        );
    }

    #[test]
    fn test_args_stream_as_partial_json() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "getWeather"), 0).unwrap();
        assert_eq!(
            assembler.parts()[0].as_tool_invocation().unwrap().args,
            json!({})
        );

        assembler.apply(&delta("c1", "{\"location\":\"San"), 0).unwrap();
        assert_eq!(
            assembler.parts()[0].as_tool_invocation().unwrap().args,
            json!({"location": "San"})
        );

        assembler.apply(&delta("c1", " Francisco\"}"), 0).unwrap();
        assert_eq!(
            assembler.parts()[0].as_tool_invocation().unwrap().args,
            json!({"location": "San Francisco"})
        );
    }

    #[test]
    fn test_result_transitions_in_place() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "getWeather"), 3).unwrap();
        assembler.apply(&delta("c1", "{\"location\":\"SF\"}"), 0).unwrap();
        assembler.apply(&result("c1", json!({"temp": 60})), 7).unwrap();

        assert_eq!(
            assembler.parts(),
            &[Part::tool_invocation(
                ToolInvocation::call("c1", "getWeather", 3)
                    .with_args(json!({"location": "SF"}))
                    .with_result(json!({"temp": 60}))
            )]
        );
        assert!(!assembler.has_open_part());
    }

    #[test]
    fn test_delta_for_unknown_call_is_rejected() {
        let mut assembler = PartAssembler::new();
        let err = assembler.apply(&delta("missing", "{}"), 0).unwrap_err();
        assert!(matches!(err, ChatError::AssemblerIntegrity(_)));
        assert!(assembler.parts().is_empty());
    }

    #[test]
    fn test_delta_for_closed_call_is_rejected() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "add"), 0).unwrap();
        assembler.apply(&text("thinking"), 0).unwrap();
        let err = assembler.apply(&delta("c1", "{\"a\":1}"), 0).unwrap_err();
        assert!(err.to_string().contains("no longer receiving"));
        assert_eq!(
            assembler.parts()[0].as_tool_invocation().unwrap().args,
            json!({})
        );
    }

    #[test]
    fn test_second_result_is_rejected() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "add"), 0).unwrap();
        assembler.apply(&result("c1", json!(3)), 0).unwrap();
        let before = assembler.parts().to_vec();
        let err = assembler.apply(&result("c1", json!(4)), 0).unwrap_err();
        assert!(matches!(err, ChatError::AssemblerIntegrity(_)));
        assert_eq!(assembler.parts(), before.as_slice());
    }

    #[test]
    fn test_result_for_unknown_call_is_rejected() {
        let mut assembler = PartAssembler::new();
        let err = assembler.apply(&result("nope", json!(null)), 0).unwrap_err();
        assert!(matches!(err, ChatError::AssemblerIntegrity(_)));
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "add"), 0).unwrap();
        assert!(assembler.apply(&start("c1", "add"), 0).is_err());
        assert_eq!(assembler.parts().len(), 1);
    }

    #[test]
    fn test_complete_call_closes_streaming_call() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&start("c1", "add"), 1).unwrap();
        assembler.apply(&delta("c1", "{\"a\":"), 1).unwrap();
        assembler
            .apply(
                &Frame::ToolCall {
                    tool_call_id: "c1".to_string(),
                    tool_name: "add".to_string(),
                    args: json!({"a": 1, "b": 2}),
                },
                1,
            )
            .unwrap();

        assert_eq!(assembler.parts().len(), 1);
        let invocation = assembler.parts()[0].as_tool_invocation().unwrap();
        assert_eq!(invocation.args, json!({"a": 1, "b": 2}));
        assert_eq!(invocation.state, ToolState::Call);
        assert!(!assembler.has_open_part());
    }

    #[test]
    fn test_complete_call_without_start_appends() {
        let mut assembler = PartAssembler::new();
        assembler.apply(&text("Adding."), 0).unwrap();
        assembler
            .apply(
                &Frame::ToolCall {
                    tool_call_id: "c9".to_string(),
                    tool_name: "multiply".to_string(),
                    args: json!({"a": 2, "b": 3}),
                },
                2,
            )
            .unwrap();
        let invocation = assembler.parts()[1].as_tool_invocation().unwrap();
        assert_eq!(invocation.step, 2);
        assert_eq!(invocation.args, json!({"a": 2, "b": 3}));
    }

    #[test]
    fn test_non_content_frame_is_rejected() {
        let mut assembler = PartAssembler::new();
        let err = assembler
            .apply(
                &Frame::StartStep {
                    message_id: "m".to_string(),
                },
                0,
            )
            .unwrap_err();
        assert!(matches!(err, ChatError::AssemblerIntegrity(_)));
    }
}
