use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ChatError, ChatResult};

/// Response header announcing the data stream protocol
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// One decoded unit of the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    TextDelta {
        content: String,
    },
    CustomData {
        payload: Vec<Value>,
    },
    Error {
        message: String,
    },
    Annotations {
        payload: Vec<Value>,
    },
    /// A tool call whose arguments are already complete
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        result: Value,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
        step: Option<u32>,
    },
    ToolCallDelta {
        tool_call_id: String,
        args_text_delta: String,
    },
    Finish {
        reason: FinishReason,
        usage: Option<Usage>,
    },
    FinishStep {
        reason: FinishReason,
        usage: Option<Usage>,
        is_continued: bool,
    },
    StartStep {
        message_id: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPayload {
    tool_call_id: String,
    tool_name: String,
    args: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPayload {
    tool_call_id: String,
    result: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallStartPayload {
    tool_call_id: String,
    tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step: Option<u32>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallDeltaPayload {
    tool_call_id: String,
    args_text_delta: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPayload {
    finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishStepPayload {
    finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    #[serde(default)]
    is_continued: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartStepPayload {
    message_id: String,
}

fn decode_payload<T: DeserializeOwned>(code: &str, payload: &str) -> ChatResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        ChatError::ProtocolDecode(format!("invalid payload for frame code {:?}: {}", code, e))
    })
}

fn encode_payload<T: Serialize>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string())
}

impl Frame {
    /// Protocol code prefixing this frame on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Frame::TextDelta { .. } => "0",
            Frame::CustomData { .. } => "2",
            Frame::Error { .. } => "3",
            Frame::Annotations { .. } => "8",
            Frame::ToolCall { .. } => "9",
            Frame::ToolResult { .. } => "a",
            Frame::ToolCallStart { .. } => "b",
            Frame::ToolCallDelta { .. } => "c",
            Frame::Finish { .. } => "d",
            Frame::FinishStep { .. } => "e",
            Frame::StartStep { .. } => "f",
        }
    }

    /// Human readable frame kind, used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::TextDelta { .. } => "text-delta",
            Frame::CustomData { .. } => "custom-data",
            Frame::Error { .. } => "error",
            Frame::Annotations { .. } => "message-annotations",
            Frame::ToolCall { .. } => "tool-call",
            Frame::ToolResult { .. } => "tool-result",
            Frame::ToolCallStart { .. } => "tool-call-start",
            Frame::ToolCallDelta { .. } => "tool-call-delta",
            Frame::Finish { .. } => "finish",
            Frame::FinishStep { .. } => "finish-step",
            Frame::StartStep { .. } => "start-step",
        }
    }

    /// Parse a single line (without its trailing newline) into a frame
    pub fn parse_line(line: &str) -> ChatResult<Frame> {
        let (code, payload) = line.split_once(':').ok_or_else(|| {
            ChatError::ProtocolDecode(format!("missing frame code separator in {:?}", line))
        })?;

        let frame = match code {
            "0" => Frame::TextDelta {
                content: decode_payload(code, payload)?,
            },
            "2" => Frame::CustomData {
                payload: decode_payload(code, payload)?,
            },
            "3" => Frame::Error {
                message: decode_payload(code, payload)?,
            },
            "8" => Frame::Annotations {
                payload: decode_payload(code, payload)?,
            },
            "9" => {
                let call: ToolCallPayload = decode_payload(code, payload)?;
                Frame::ToolCall {
                    tool_call_id: call.tool_call_id,
                    tool_name: call.tool_name,
                    args: call.args,
                }
            }
            "a" => {
                let result: ToolResultPayload = decode_payload(code, payload)?;
                Frame::ToolResult {
                    tool_call_id: result.tool_call_id,
                    result: result.result,
                }
            }
            "b" => {
                let start: ToolCallStartPayload = decode_payload(code, payload)?;
                Frame::ToolCallStart {
                    tool_call_id: start.tool_call_id,
                    tool_name: start.tool_name,
                    step: start.step,
                }
            }
            "c" => {
                let delta: ToolCallDeltaPayload = decode_payload(code, payload)?;
                Frame::ToolCallDelta {
                    tool_call_id: delta.tool_call_id,
                    args_text_delta: delta.args_text_delta,
                }
            }
            "d" => {
                let finish: FinishPayload = decode_payload(code, payload)?;
                Frame::Finish {
                    reason: finish.finish_reason,
                    usage: finish.usage,
                }
            }
            "e" => {
                let finish: FinishStepPayload = decode_payload(code, payload)?;
                Frame::FinishStep {
                    reason: finish.finish_reason,
                    usage: finish.usage,
                    is_continued: finish.is_continued,
                }
            }
            "f" => {
                let start: StartStepPayload = decode_payload(code, payload)?;
                Frame::StartStep {
                    message_id: start.message_id,
                }
            }
            other => {
                return Err(ChatError::ProtocolDecode(format!(
                    "unknown frame code {:?}",
                    other
                )))
            }
        };

        Ok(frame)
    }

    /// Encode the frame as a complete wire line, including the trailing newline
    pub fn encode(&self) -> String {
        let payload = match self {
            Frame::TextDelta { content } => encode_payload(content),
            Frame::CustomData { payload } | Frame::Annotations { payload } => {
                encode_payload(payload)
            }
            Frame::Error { message } => encode_payload(message),
            Frame::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => encode_payload(&ToolCallPayload {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                args: args.clone(),
            }),
            Frame::ToolResult {
                tool_call_id,
                result,
            } => encode_payload(&ToolResultPayload {
                tool_call_id: tool_call_id.clone(),
                result: result.clone(),
            }),
            Frame::ToolCallStart {
                tool_call_id,
                tool_name,
                step,
            } => encode_payload(&ToolCallStartPayload {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                step: *step,
            }),
            Frame::ToolCallDelta {
                tool_call_id,
                args_text_delta,
            } => encode_payload(&ToolCallDeltaPayload {
                tool_call_id: tool_call_id.clone(),
                args_text_delta: args_text_delta.clone(),
            }),
            Frame::Finish { reason, usage } => encode_payload(&FinishPayload {
                finish_reason: *reason,
                usage: *usage,
            }),
            Frame::FinishStep {
                reason,
                usage,
                is_continued,
            } => encode_payload(&FinishStepPayload {
                finish_reason: *reason,
                usage: *usage,
                is_continued: *is_continued,
            }),
            Frame::StartStep { message_id } => encode_payload(&StartStepPayload {
                message_id: message_id.clone(),
            }),
        };
        format!("{}:{}\n", self.code(), payload)
    }
}
