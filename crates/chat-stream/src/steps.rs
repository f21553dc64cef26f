use crate::models::part::Part;

/// Tracks tool-call steps within one user-initiated turn and decides when the
/// turn should continue automatically.
///
/// `max_steps` bounds the number of steps a turn may span; `0` and `1` both
/// disable automatic continuation.
#[derive(Debug, Clone)]
pub struct StepController {
    max_steps: u32,
    current_step: u32,
    // a finish-step frame closed `current_step`; the next unstamped call opens a new one
    step_closed: bool,
    results_since_submit: usize,
    // automatic re-submissions in this turn; server step numbers never touch it
    continuations: u32,
}

impl StepController {
    pub fn new(max_steps: u32) -> Self {
        StepController {
            max_steps,
            current_step: 0,
            step_closed: false,
            results_since_submit: 0,
            continuations: 0,
        }
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Reset for a new user-initiated turn
    pub fn begin_turn(&mut self) {
        self.current_step = 0;
        self.step_closed = false;
        self.results_since_submit = 0;
        self.continuations = 0;
    }

    /// Step to stamp on a new tool call. A step supplied by the server is
    /// recorded as-is.
    pub fn step_for_tool_call(&mut self, server_step: Option<u32>) -> u32 {
        let step = match server_step {
            Some(step) => step,
            None if self.step_closed => self.current_step + 1,
            None => self.current_step,
        };
        self.current_step = step;
        self.step_closed = false;
        step
    }

    pub fn record_tool_result(&mut self) {
        self.results_since_submit += 1;
    }

    /// The server closed a step inside a single response
    pub fn finish_step(&mut self) {
        self.step_closed = true;
    }

    /// Whether the finished response should be re-submitted to continue the turn.
    ///
    /// Requires at least one tool result since the last submission, no
    /// invocation still waiting for its result, and room under `max_steps`
    /// counting the steps this controller has opened itself.
    pub fn should_continue(&self, parts: &[Part]) -> bool {
        if self.results_since_submit == 0 || self.continuations + 1 >= self.max_steps {
            return false;
        }
        parts
            .iter()
            .filter_map(Part::as_tool_invocation)
            .all(|invocation| invocation.is_resolved())
    }

    /// Move to the next step for an automatic re-submission
    pub fn advance(&mut self) {
        self.continuations += 1;
        self.current_step += 1;
        self.step_closed = false;
        self.results_since_submit = 0;
    }
}
