//! Executable workflow nodes.
//!
//! A [`Node`] is a named unit of user computation: it receives the frame's
//! state and an execution context and returns a
//! [`NodeOutput`](crate::control::NodeOutput) result variant. Nodes hold no
//! mutable internal state and must be safe to run concurrently, since every
//! superstep dispatches all active frames in parallel.
//!
//! # Examples
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use serde_json::json;
//! use stepgraph::control::NodeOutput;
//! use stepgraph::node::{Node, NodeContext, NodeError};
//! use stepgraph::state::{delta, GraphState};
//!
//! struct Doubler;
//!
//! #[async_trait]
//! impl Node for Doubler {
//!     async fn run(&self, state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
//!         let number = state.get("number").and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(delta([("result", json!(number * 2))]).into())
//!     }
//! }
//! ```

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::control::NodeOutput;
use crate::observers::{ObserverSet, RunEvent};
use crate::state::{GraphState, StateError};
use crate::types::NodeName;

/// Execution context handed to a node for one invocation.
///
/// Carries the node's identity, the executing superstep, the thread id, the
/// caller-supplied context value, and the run's observer handle so
/// collaborator nodes can emit request/response events keyed by the node
/// that is executing.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Name of the executing node.
    pub node: NodeName,
    /// Superstep being executed.
    pub step: u64,
    /// Thread this run belongs to.
    pub thread_id: String,
    /// Caller-supplied context value, shared across all frames of the run.
    pub context: Option<Arc<Value>>,
    /// Observer handle for collaborator notifications.
    pub observers: ObserverSet,
}

impl NodeContext {
    /// Emit an event through the run's observer set.
    pub fn emit(&self, event: RunEvent) {
        self.observers.emit(event);
    }
}

/// Context available to conditional-edge routers.
///
/// Routers observe state but must not mutate it; they receive no observer
/// handle because routing is pure.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub step: u64,
    pub thread_id: String,
    pub context: Option<Arc<Value>>,
}

/// A named unit of computation within a workflow.
///
/// Implementations should be stateless and deterministic with respect to
/// their inputs; anything they return is merged or routed by the scheduler.
/// A raised [`NodeError`] terminates the run after the `node_error` and
/// `graph_end` events.
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against the frame's state.
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, NodeError>;

    /// Class tag surfaced to observers (e.g. `"task"`, `"chat"`, `"tool"`).
    fn tag(&self) -> &str {
        "task"
    }
}

/// Adapter turning a synchronous closure into a [`Node`].
///
/// Most workflow steps are plain functions over state; this keeps them
/// one-liners. Nodes that need to await something implement [`Node`]
/// directly.
pub struct FnNode<F> {
    func: F,
}

impl<F> FnNode<F>
where
    F: Fn(&GraphState, &NodeContext) -> Result<NodeOutput, NodeError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&GraphState, &NodeContext) -> Result<NodeOutput, NodeError> + Send + Sync,
{
    async fn run(&self, state: &GraphState, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        (self.func)(state, ctx)
    }
}

/// Identity node backing the synthetic Start/Finish endpoints.
pub(crate) struct IdentityNode;

#[async_trait]
impl Node for IdentityNode {
    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::empty())
    }

    fn tag(&self) -> &str {
        "system"
    }
}

/// Fatal faults raised inside a node callable.
///
/// The scheduler wraps these with the node's name and step before they reach
/// the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(stepgraph::node::missing_input),
        help("Check that an upstream node produced the required key.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(stepgraph::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(stepgraph::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(stepgraph::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// State-layer fault while reading typed values.
    #[error(transparent)]
    #[diagnostic(code(stepgraph::node::state))]
    State(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducers::ReducerRegistry;
    use crate::state::delta;
    use serde_json::json;

    fn ctx() -> NodeContext {
        NodeContext {
            node: NodeName::Custom("test".into()),
            step: 1,
            thread_id: "t".into(),
            context: None,
            observers: ObserverSet::default(),
        }
    }

    #[tokio::test]
    async fn fn_node_runs_closure() {
        let node = FnNode::new(|state: &GraphState, _ctx: &NodeContext| {
            let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(delta([("n", json!(n + 1))]).into())
        });
        let state = GraphState::new(Arc::new(ReducerRegistry::new()))
            .merge(delta([("n", json!(41))]));
        match node.run(&state, &ctx()).await.unwrap() {
            NodeOutput::Delta(d) => assert_eq!(d.get("n"), Some(&json!(42))),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identity_node_is_empty_delta() {
        let state = GraphState::new(Arc::new(ReducerRegistry::new()));
        let out = IdentityNode.run(&state, &ctx()).await.unwrap();
        assert_eq!(out, NodeOutput::empty());
        assert_eq!(IdentityNode.tag(), "system");
    }
}
