#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stepgraph::control::NodeOutput;
use stepgraph::node::{Node, NodeContext, NodeError};
use stepgraph::state::{GraphState, StateDelta};

/// Node that always returns the same delta.
#[derive(Clone, Debug)]
pub struct DeltaNode {
    pub delta: StateDelta,
}

impl DeltaNode {
    pub fn new(delta: StateDelta) -> Self {
        Self { delta }
    }
}

#[async_trait]
impl Node for DeltaNode {
    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::Delta(self.delta.clone()))
    }
}

/// Node that always fails with a missing-input fault.
#[derive(Clone, Debug)]
pub struct FailingNode {
    pub what: &'static str,
}

impl Default for FailingNode {
    fn default() -> Self {
        Self { what: "test_key" }
    }
}

#[async_trait]
impl Node for FailingNode {
    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::MissingInput { what: self.what })
    }
}

/// Node that sleeps before returning its delta; used to exercise the
/// superstep barrier.
#[derive(Clone, Debug)]
pub struct SlowDeltaNode {
    pub delay: Duration,
    pub delta: StateDelta,
}

impl SlowDeltaNode {
    pub fn new(delay_ms: u64, delta: StateDelta) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            delta,
        }
    }
}

#[async_trait]
impl Node for SlowDeltaNode {
    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        tokio::time::sleep(self.delay).await;
        Ok(NodeOutput::Delta(self.delta.clone()))
    }
}

/// Node counting how many times it executed.
#[derive(Clone)]
pub struct CountingNode {
    pub hits: Arc<AtomicUsize>,
    pub delta: StateDelta,
}

impl CountingNode {
    pub fn new(hits: Arc<AtomicUsize>, delta: StateDelta) -> Self {
        Self { hits, delta }
    }
}

#[async_trait]
impl Node for CountingNode {
    async fn run(&self, _state: &GraphState, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(NodeOutput::Delta(self.delta.clone()))
    }
}
