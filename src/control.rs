//! Control-flow results emitted by nodes.
//!
//! A node returns a [`NodeOutput`]: a plain state delta, a [`Command`]
//! combining an update with a forced destination, one or many [`Dispatch`]
//! sends that schedule fresh frames with merged payloads, or an
//! [`Interrupt`] suspending the frame for external input. The runner
//! translates these into next-step frames, so nodes express routing intent
//! without touching the scheduler directly.

use serde_json::Value;
use std::sync::Arc;

use crate::state::StateDelta;
use crate::types::NodeName;

/// Result variant returned by a node invocation.
///
/// The runtime dispatches on this tagged sum; there is no structural
/// fallback. [`NodeOutput::default()`] is the empty delta, and `From`
/// conversions cover the common shapes so node bodies stay terse.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use stepgraph::control::{Command, NodeOutput};
/// use stepgraph::state::delta;
///
/// let update: NodeOutput = delta([("message", json!("Skipped"))]).into();
/// let skip: NodeOutput = Command::new()
///     .with_update(delta([("message", json!("Skipped"))]))
///     .with_goto("Finish")
///     .into();
/// assert!(matches!(update, NodeOutput::Delta(_)));
/// assert!(matches!(skip, NodeOutput::Command(_)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum NodeOutput {
    /// Key→value map merged into the frame's state via the reducer table.
    Delta(StateDelta),
    /// Optional update plus an optional forced destination.
    Command(Command),
    /// Schedule one new frame carrying a merged payload.
    Send(Dispatch),
    /// Schedule several new frames, in order.
    MultiSend(Vec<Dispatch>),
    /// Suspend this frame pending external input.
    Interrupt(Interrupt),
}

impl NodeOutput {
    /// The empty delta: merges to an unchanged state.
    #[must_use]
    pub fn empty() -> Self {
        NodeOutput::Delta(StateDelta::default())
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<StateDelta> for NodeOutput {
    fn from(delta: StateDelta) -> Self {
        NodeOutput::Delta(delta)
    }
}

impl From<Command> for NodeOutput {
    fn from(command: Command) -> Self {
        NodeOutput::Command(command)
    }
}

impl From<Dispatch> for NodeOutput {
    fn from(dispatch: Dispatch) -> Self {
        NodeOutput::Send(dispatch)
    }
}

impl From<Vec<Dispatch>> for NodeOutput {
    fn from(dispatches: Vec<Dispatch>) -> Self {
        NodeOutput::MultiSend(dispatches)
    }
}

impl From<Interrupt> for NodeOutput {
    fn from(interrupt: Interrupt) -> Self {
        NodeOutput::Interrupt(interrupt)
    }
}

/// Combines an optional state update with an optional forced destination.
///
/// When `goto` is set, it overrides edge-based routing for this frame: the
/// frame advances to exactly that node, and the source's declared edges are
/// not evaluated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Command {
    /// Delta merged before routing.
    pub update: Option<StateDelta>,
    /// Forced destination, bypassing edge evaluation.
    pub goto: Option<NodeName>,
}

impl Command {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a state update.
    #[must_use]
    pub fn with_update(mut self, update: StateDelta) -> Self {
        self.update = Some(update);
        self
    }

    /// Force the next destination.
    #[must_use]
    pub fn with_goto(mut self, goto: impl Into<NodeName>) -> Self {
        self.goto = Some(goto.into());
        self
    }
}

/// Dynamic fan-out primitive: one new frame at `to` whose state is the
/// sender's state merged with `payload`.
///
/// Named `Dispatch` so `std::marker::Send` bounds stay unshadowed.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub to: NodeName,
    pub payload: StateDelta,
}

impl Dispatch {
    #[must_use]
    pub fn new(to: impl Into<NodeName>, payload: StateDelta) -> Self {
        Self {
            to: to.into(),
            payload,
        }
    }
}

/// Suspension request: the frame pauses until an external delta arrives.
///
/// With a registered handler the node re-runs with the injected delta
/// merged in; without one, the run terminates cleanly with the
/// pre-interrupt state.
#[derive(Clone, Debug, PartialEq)]
pub struct Interrupt {
    /// Human-readable reason for the pause.
    pub message: String,
    /// Structured payload for the external party.
    pub data: Value,
}

impl Interrupt {
    #[must_use]
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// Callback invoked when a node interrupts; the returned delta is merged
/// before the node re-runs.
pub type InterruptHandler = Arc<dyn Fn(&Interrupt) -> Option<StateDelta> + Send + Sync>;
