//! These models represent the conversation as the chat interface sees it
//!
//! A message is an ordered list of parts. Parts are either text spans or tool
//! invocations, and serialize in the camelCase shape a `useChat`-style page renders:
//! `{"type": "text", "text": ...}` and `{"type": "tool-invocation", "toolInvocation": {...}}`.
pub mod message;
pub mod part;
pub mod role;
