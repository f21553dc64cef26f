use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::protocol::Frame;

/// Raw response chunks in arrival order
pub type ChunkStream = BoxStream<'static, ChatResult<Bytes>>;

/// A submission: conversation history plus the caller's side-channel payloads
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<Message>,
    /// Out-of-band extra data, sent as `data`
    pub data: Option<Value>,
    /// Extra fields merged into the request body
    pub body: Map<String, Value>,
    pub send_extra_message_fields: bool,
}

impl ChatRequest {
    /// The JSON body a data stream endpoint expects. Fixed keys win over extra body keys.
    pub fn to_body(&self) -> Value {
        let mut body = self.body.clone();
        body.insert("id".to_string(), Value::String(self.id.clone()));
        body.insert(
            "messages".to_string(),
            Value::Array(
                self.messages
                    .iter()
                    .map(|message| message.to_request_value(self.send_extra_message_fields))
                    .collect(),
            ),
        );
        if let Some(data) = &self.data {
            body.insert("data".to_string(), data.clone());
        }
        Value::Object(body)
    }
}

/// Opens the response stream for a submission
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: ChatRequest) -> ChatResult<ChunkStream>;
}

/// One canned response of a [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Chunks delivered in order, then end of stream
    Chunks(Vec<ChatResult<Bytes>>),
    /// Chunks delivered in order, then the stream never yields again
    Stalled(Vec<Bytes>),
    /// The request itself fails
    Reject(ChatError),
}

impl ScriptedResponse {
    /// Each frame encoded into its own chunk
    pub fn frames(frames: &[Frame]) -> Self {
        ScriptedResponse::Chunks(
            frames
                .iter()
                .map(|frame| Ok(Bytes::from(frame.encode())))
                .collect(),
        )
    }

    /// A raw body split into chunks of at most `chunk_size` bytes
    pub fn body(body: impl Into<Bytes>, chunk_size: usize) -> Self {
        let body: Bytes = body.into();
        let chunk_size = chunk_size.max(1);
        let chunks = (0..body.len())
            .step_by(chunk_size)
            .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
            .collect();
        ScriptedResponse::Chunks(chunks)
    }

    /// Frames delivered, after which the stream hangs open
    pub fn stalled(frames: &[Frame]) -> Self {
        ScriptedResponse::Stalled(frames.iter().map(|frame| Bytes::from(frame.encode())).collect())
    }
}

/// A transport that replays pre-recorded responses and records every request
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request sent so far, oldest first
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: ChatRequest) -> ChatResult<ChunkStream> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match response {
            Some(ScriptedResponse::Chunks(chunks)) => Ok(stream::iter(chunks).boxed()),
            Some(ScriptedResponse::Stalled(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(ScriptedResponse::Reject(error)) => Err(error),
            None => Err(ChatError::Transport(
                "no scripted response left".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_merges_extra_fields_under_fixed_keys() {
        let mut extra = Map::new();
        extra.insert("msg".to_string(), json!("this is fake body"));
        extra.insert("id".to_string(), json!("should be overwritten"));

        let request = ChatRequest {
            id: "chat-1".to_string(),
            messages: vec![Message::user().with_text("hi")],
            data: Some(json!({"msg": "this is fake data"})),
            body: extra,
            send_extra_message_fields: false,
        };

        assert_eq!(
            request.to_body(),
            json!({
                "id": "chat-1",
                "msg": "this is fake body",
                "messages": [{"role": "user", "content": "hi"}],
                "data": {"msg": "this is fake data"}
            })
        );
    }

    #[test]
    fn test_body_without_data() {
        let request = ChatRequest {
            id: "chat-1".to_string(),
            messages: Vec::new(),
            data: None,
            body: Map::new(),
            send_extra_message_fields: true,
        };
        assert!(request.to_body().get("data").is_none());
    }

    #[test]
    fn test_body_chunks_cover_everything() {
        let ScriptedResponse::Chunks(chunks) = ScriptedResponse::body("0:\"abc\"\n", 3) else {
            panic!("expected chunks");
        };
        let joined: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(joined, b"0:\"abc\"\n");
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new(vec![
            ScriptedResponse::frames(&[Frame::TextDelta {
                content: "one".to_string(),
            }]),
            ScriptedResponse::Reject(ChatError::Transport("offline".to_string())),
        ]);
        let request = ChatRequest {
            id: "chat".to_string(),
            messages: Vec::new(),
            data: None,
            body: Map::new(),
            send_extra_message_fields: false,
        };

        let chunks: Vec<_> = transport.send(request.clone()).await.unwrap().collect().await;
        assert_eq!(chunks, vec![Ok(Bytes::from("0:\"one\"\n"))]);

        let err = transport.send(request.clone()).await.err();
        assert_eq!(err, Some(ChatError::Transport("offline".to_string())));

        assert!(transport.send(request).await.is_err());
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.remaining(), 0);
    }
}
