use rustc_hash::FxHashMap;
use serde_json::Value;
use std::time::Duration;

use crate::control::NodeOutput;
use crate::types::NodeName;

/// Lifecycle event emitted by the runner, the scheduler, or a collaborator
/// node while a run advances.
///
/// State fields are detached snapshots: observers may hold them as long as
/// they like without coupling to the run's live state.
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// A run is starting.
    GraphStart {
        graph: String,
        thread_id: String,
        state: FxHashMap<String, Value>,
        context: Option<Value>,
    },
    /// A run has ended, successfully or not; carries the last known state.
    GraphEnd {
        thread_id: String,
        state: FxHashMap<String, Value>,
    },
    /// A node invocation is about to begin.
    NodeStart {
        node: NodeName,
        tag: String,
        step: u64,
        state_before: FxHashMap<String, Value>,
    },
    /// A node invocation returned; carries the raw result and the state as
    /// merged by the frame.
    NodeEnd {
        node: NodeName,
        tag: String,
        step: u64,
        state_before: FxHashMap<String, Value>,
        state_after: FxHashMap<String, Value>,
        result: NodeOutput,
        duration: Duration,
    },
    /// A node invocation raised a fault; the run terminates after this.
    NodeError {
        node: NodeName,
        tag: String,
        step: u64,
        state_before: FxHashMap<String, Value>,
        error: String,
    },
    /// A superstep barrier completed.
    StepComplete {
        step: u64,
        active_nodes: Vec<NodeName>,
        state: FxHashMap<String, Value>,
        duration: Duration,
    },
    /// A node returned a `Command`; `goto` is the forced destination, if any.
    CommandProcessed {
        node: NodeName,
        step: u64,
        goto: Option<NodeName>,
    },
    /// A node suspended for external input. `resumed` is `true` when a
    /// handler supplied a delta and the node was requeued.
    Interrupted {
        node: NodeName,
        step: u64,
        message: String,
        data: Value,
        resumed: bool,
    },
    /// A checkpoint was durably written for `(thread_id, step)`.
    CheckpointSaved { thread_id: String, step: u64 },
    /// A collaborator (chat model client) issued a request, keyed by the
    /// executing node.
    LlmRequest { node: String, payload: Value },
    /// A collaborator received a response.
    LlmResponse { node: String, payload: Value },
    /// A collaborator call failed.
    LlmError { node: String, error: String },
    /// The runner is done emitting events for this run.
    Shutdown,
}

impl RunEvent {
    /// Stable label for logs and assertions.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RunEvent::GraphStart { .. } => "graph_start",
            RunEvent::GraphEnd { .. } => "graph_end",
            RunEvent::NodeStart { .. } => "node_start",
            RunEvent::NodeEnd { .. } => "node_end",
            RunEvent::NodeError { .. } => "node_error",
            RunEvent::StepComplete { .. } => "step_complete",
            RunEvent::CommandProcessed { .. } => "command_processed",
            RunEvent::Interrupted { .. } => "interrupt",
            RunEvent::CheckpointSaved { .. } => "checkpoint_saved",
            RunEvent::LlmRequest { .. } => "llm_request",
            RunEvent::LlmResponse { .. } => "llm_response",
            RunEvent::LlmError { .. } => "llm_error",
            RunEvent::Shutdown => "shutdown",
        }
    }

    /// The superstep this event belongs to, when it has one.
    #[must_use]
    pub fn step(&self) -> Option<u64> {
        match self {
            RunEvent::NodeStart { step, .. }
            | RunEvent::NodeEnd { step, .. }
            | RunEvent::NodeError { step, .. }
            | RunEvent::StepComplete { step, .. }
            | RunEvent::CommandProcessed { step, .. }
            | RunEvent::Interrupted { step, .. }
            | RunEvent::CheckpointSaved { step, .. } => Some(*step),
            _ => None,
        }
    }
}
