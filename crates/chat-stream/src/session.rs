use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::{ChatError, ChatResult};
use crate::models::message::Message;
use crate::protocol::{decode_frames, Frame, Usage};
use crate::reconciler::MessageReconciler;
use crate::steps::StepController;
use crate::transport::{ChatRequest, ChatTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Idle,
    Submitted,
    Streaming,
    Error,
    Ready,
}

impl ChatStatus {
    /// Whether a turn is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChatStatus::Idle => "idle",
            ChatStatus::Submitted => "submitted",
            ChatStatus::Streaming => "streaming",
            ChatStatus::Error => "error",
            ChatStatus::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Everything an observer can see, captured after a fully applied update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub messages: Vec<Arc<Message>>,
    pub status: ChatStatus,
    pub current_step: u32,
    pub error: Option<ChatError>,
    /// Items received through custom-data frames, across the session
    pub data: Vec<Value>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Chat id sent with every request; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Upper bound on steps per turn. `0` or `1` disables automatic continuation.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Send whole messages as history instead of `role` and `content` only
    #[serde(default)]
    pub send_extra_message_fields: bool,
    #[serde(skip)]
    pub initial_messages: Vec<Message>,
}

fn default_max_steps() -> u32 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            id: None,
            max_steps: default_max_steps(),
            send_extra_message_fields: false,
            initial_messages: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_initial_messages(mut self, messages: Vec<Message>) -> Self {
        self.initial_messages = messages;
        self
    }
}

/// Side-channel payloads for one submission
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub extra_data: Option<Value>,
    pub extra_body: Option<Map<String, Value>>,
}

impl SubmitOptions {
    pub fn with_data(mut self, data: Value) -> Self {
        self.extra_data = Some(data);
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.extra_body = Some(body);
        self
    }
}

struct ActiveTurn {
    turn: u64,
    cancel_tx: watch::Sender<bool>,
}

struct Inner {
    reconciler: MessageReconciler,
    steps: StepController,
    status: ChatStatus,
    error: Option<ChatError>,
    data: Vec<Value>,
    usage: Option<Usage>,
    turns_started: u64,
    active: Option<ActiveTurn>,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.reconciler.messages().to_vec(),
            status: self.status,
            current_step: self.steps.current_step(),
            error: self.error.clone(),
            data: self.data.clone(),
            usage: self.usage,
        }
    }

    fn is_active(&self, turn: u64) -> bool {
        self.active.as_ref().is_some_and(|active| active.turn == turn)
    }

    fn apply_frame(&mut self, frame: &Frame) -> ChatResult<()> {
        match frame {
            Frame::CustomData { payload } => {
                self.data.extend(payload.iter().cloned());
                Ok(())
            }
            Frame::Finish { usage, .. } => {
                if usage.is_some() {
                    self.usage = *usage;
                }
                self.reconciler.apply(frame, &mut self.steps)
            }
            _ => self.reconciler.apply(frame, &mut self.steps),
        }
    }
}

/// How one request/response cycle within a turn ended
enum StepOutcome {
    Continue,
    Done,
    Cancelled,
    Failed(ChatError),
}

/// The public face of the engine: submit input, watch messages and status, cancel.
///
/// Frames are applied one at a time under a lock that is never held across an
/// await, so every published snapshot reflects whole frames only.
pub struct ChatSession<T: ChatTransport> {
    id: String,
    transport: T,
    send_extra_message_fields: bool,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<Arc<SessionSnapshot>>,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let id = config.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let inner = Inner {
            reconciler: MessageReconciler::new(config.initial_messages),
            steps: StepController::new(config.max_steps),
            status: ChatStatus::Idle,
            error: None,
            data: Vec::new(),
            usage: None,
            turns_started: 0,
            active: None,
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(inner.snapshot()));

        ChatSession {
            id,
            transport,
            send_extra_message_fields: config.send_extra_message_fields,
            inner: Mutex::new(inner),
            snapshot_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.snapshot_tx.borrow().messages.clone()
    }

    pub fn status(&self) -> ChatStatus {
        self.snapshot_tx.borrow().status
    }

    pub fn error(&self) -> Option<ChatError> {
        self.snapshot_tx.borrow().error.clone()
    }

    pub fn current_step(&self) -> u32 {
        self.snapshot_tx.borrow().current_step
    }

    pub fn data(&self) -> Vec<Value> {
        self.snapshot_tx.borrow().data.clone()
    }

    /// Replace the conversation between turns
    pub fn set_messages(&self, messages: Vec<Message>) -> ChatResult<()> {
        let mut inner = self.lock();
        if inner.status.is_busy() {
            return Err(ChatError::InvalidState(
                "cannot replace messages while a turn is in flight".to_string(),
            ));
        }
        inner.reconciler.set_messages(messages)?;
        self.publish(&inner);
        Ok(())
    }

    /// Submit user input and drive the resulting turn to its end.
    ///
    /// Fails immediately with [`ChatError::InvalidState`] while another turn is
    /// in flight. Stream-level failures are recorded on the session (status
    /// `error`) and also returned. A cancelled turn returns `Ok`.
    pub async fn submit(&self, input: impl Into<String>, options: SubmitOptions) -> ChatResult<()> {
        let (turn, mut cancel_rx) = self.begin_turn(input.into())?;

        loop {
            let request = self.build_request(&options);
            match self.run_step(turn, request, &mut cancel_rx).await {
                StepOutcome::Continue => {
                    if !self.continue_turn(turn) {
                        return Ok(());
                    }
                }
                StepOutcome::Done | StepOutcome::Cancelled => return Ok(()),
                StepOutcome::Failed(error) => return Err(error),
            }
        }
    }

    /// Stop the active turn at the next frame boundary.
    ///
    /// The in-flight message keeps its partial content and the status becomes
    /// `ready`. Does nothing when no turn is active.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        let Some(active) = inner.active.take() else {
            return;
        };
        let _ = active.cancel_tx.send(true);
        inner.reconciler.finalize();
        inner.status = ChatStatus::Ready;
        tracing::debug!(turn = active.turn, "turn cancelled");
        self.publish(&inner);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(Arc::new(inner.snapshot()));
    }

    fn begin_turn(&self, input: String) -> ChatResult<(u64, watch::Receiver<bool>)> {
        let mut inner = self.lock();
        if inner.status.is_busy() || inner.active.is_some() {
            return Err(ChatError::InvalidState(format!(
                "cannot submit while status is {}",
                inner.status
            )));
        }

        inner
            .reconciler
            .begin_turn(Message::user().with_text(input))?;
        inner.steps.begin_turn();
        inner.error = None;
        inner.status = ChatStatus::Submitted;

        inner.turns_started += 1;
        let turn = inner.turns_started;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        inner.active = Some(ActiveTurn { turn, cancel_tx });

        tracing::debug!(session = %self.id, turn, "turn submitted");
        self.publish(&inner);
        Ok((turn, cancel_rx))
    }

    fn build_request(&self, options: &SubmitOptions) -> ChatRequest {
        let inner = self.lock();
        ChatRequest {
            id: self.id.clone(),
            messages: inner.reconciler.history(),
            data: options.extra_data.clone(),
            body: options.extra_body.clone().unwrap_or_default(),
            send_extra_message_fields: self.send_extra_message_fields,
        }
    }

    /// Open the next step of an automatically continued turn
    fn continue_turn(&self, turn: u64) -> bool {
        let mut inner = self.lock();
        if !inner.is_active(turn) {
            return false;
        }
        if let Err(error) = inner.reconciler.open_assistant() {
            self.fail(&mut inner, error);
            return false;
        }
        inner.steps.advance();
        inner.status = ChatStatus::Submitted;
        tracing::debug!(turn, step = inner.steps.current_step(), "continuing turn");
        self.publish(&inner);
        true
    }

    async fn run_step(
        &self,
        turn: u64,
        request: ChatRequest,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> StepOutcome {
        let opened = tokio::select! {
            biased;
            _ = cancelled(cancel_rx) => return StepOutcome::Cancelled,
            opened = self.transport.send(request) => opened,
        };

        let chunks = match opened {
            Ok(chunks) => chunks,
            Err(error) => return self.fail_turn(turn, error),
        };

        let mut frames = decode_frames(chunks);
        let mut finished = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel_rx) => return StepOutcome::Cancelled,
                next = frames.next() => next,
            };

            if let Some(outcome) = self.handle_next(turn, next, &mut finished) {
                return outcome;
            }
        }
    }

    /// Apply whatever the stream produced next. Returns an outcome once the
    /// step is over.
    fn handle_next(
        &self,
        turn: u64,
        next: Option<ChatResult<Frame>>,
        finished: &mut bool,
    ) -> Option<StepOutcome> {
        let mut inner = self.lock();
        if !inner.is_active(turn) {
            return Some(StepOutcome::Cancelled);
        }

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => return Some(self.fail(&mut inner, error)),
            None => return Some(self.end_of_stream(&mut inner, *finished)),
        };

        tracing::debug!(kind = frame.kind(), "frame received");
        if inner.status == ChatStatus::Submitted {
            inner.status = ChatStatus::Streaming;
        }
        if let Err(error) = inner.apply_frame(&frame) {
            return Some(self.fail(&mut inner, error));
        }
        if let Frame::Finish { .. } = frame {
            *finished = true;
        }

        self.publish(&inner);
        None
    }

    fn end_of_stream(&self, inner: &mut Inner, finished: bool) -> StepOutcome {
        if !finished {
            tracing::debug!("stream ended without a finish frame");
            inner.reconciler.finalize();
        }

        if inner
            .steps
            .should_continue(inner.reconciler.last_assistant_parts())
        {
            return StepOutcome::Continue;
        }

        inner.active = None;
        inner.status = ChatStatus::Ready;
        self.publish(inner);
        StepOutcome::Done
    }

    fn fail_turn(&self, turn: u64, error: ChatError) -> StepOutcome {
        let mut inner = self.lock();
        if !inner.is_active(turn) {
            return StepOutcome::Cancelled;
        }
        self.fail(&mut inner, error)
    }

    fn fail(&self, inner: &mut Inner, error: ChatError) -> StepOutcome {
        tracing::error!(session = %self.id, error = %error, "turn failed");
        inner.reconciler.finalize();
        inner.active = None;
        inner.status = ChatStatus::Error;
        inner.error = Some(error.clone());
        self.publish(inner);
        StepOutcome::Failed(error)
    }
}

/// Resolves once cancellation has been requested. Never resolves if the
/// sender goes away without requesting it.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            if *cancel_rx.borrow() {
                return;
            }
            std::future::pending::<()>().await;
        }
    }
}
