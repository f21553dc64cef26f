use super::part::{Part, ToolInvocation};
use super::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A message in the conversation, composed of ordered parts
pub struct Message {
    pub id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Value>,
}

impl Message {
    /// Create an empty message with a fresh id and the current timestamp
    pub fn new(role: Role) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            role,
            created_at: Utc::now(),
            parts: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    /// Add any part to the message
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Add a text part to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_part(Part::text(text))
    }

    /// Add a tool invocation part to the message
    pub fn with_tool_invocation(self, tool_invocation: ToolInvocation) -> Self {
        self.with_part(Part::tool_invocation(tool_invocation))
    }

    /// All text parts joined in order, the way `content` is derived for requests
    pub fn text_content(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(Part::as_tool_invocation)
    }

    /// The JSON shape sent back to the server as conversation history.
    ///
    /// With `extra_fields` the whole message is sent; otherwise only `role` and
    /// the derived `content`.
    pub fn to_request_value(&self, extra_fields: bool) -> Value {
        if !extra_fields {
            return json!({
                "role": self.role,
                "content": self.text_content(),
            });
        }

        let mut value = json!({
            "id": self.id,
            "role": self.role,
            "content": self.text_content(),
            "createdAt": self.created_at,
            "parts": self.parts,
        });
        if !self.annotations.is_empty() {
            value["annotations"] = json!(self.annotations);
        }
        value
    }
}
