use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Call,
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub state: ToolState,
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolInvocation {
    /// A new invocation in the `call` state with empty args
    pub fn call<S: Into<String>, N: Into<String>>(tool_call_id: S, tool_name: N, step: u32) -> Self {
        ToolInvocation {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args: Value::Object(Map::new()),
            state: ToolState::Call,
            step,
            result: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.state = ToolState::Result;
        self.result = Some(result);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ToolState::Result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
/// One ordered constituent of a message
pub enum Part {
    Text(TextPart),
    #[serde(rename_all = "camelCase")]
    ToolInvocation { tool_invocation: ToolInvocation },
}

impl Part {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Part::Text(TextPart { text: text.into() })
    }

    pub fn tool_invocation(tool_invocation: ToolInvocation) -> Self {
        Part::ToolInvocation { tool_invocation }
    }

    /// Get the text if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(part) => Some(&part.text),
            _ => None,
        }
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Part::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        }
    }

    pub(crate) fn as_tool_invocation_mut(&mut self) -> Option<&mut ToolInvocation> {
        match self {
            Part::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        }
    }
}
