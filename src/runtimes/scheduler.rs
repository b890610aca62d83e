//! Parallel frame dispatch for one superstep.
//!
//! The scheduler owns the BSP barrier: every active frame is spawned as a
//! task (bounded by a concurrency cap), and `run_step` does not return until
//! every task has completed — even when one of them fails. Results are
//! collected in submission order regardless of completion order.
//!
//! Each frame is wrapped with observer events and timing: `node_start`
//! before the call, `node_end` (with the raw result and the merged state)
//! or `node_error` after it. The frame's reducer merge happens here, once,
//! so the runner can reuse the merged state without re-invoking reducers.

use miette::Diagnostic;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

use super::runner::ExecutionFrame;
use crate::control::NodeOutput;
use crate::graph::Graph;
use crate::node::{NodeContext, NodeError};
use crate::observers::{ObserverSet, RunEvent};
use crate::state::GraphState;
use crate::types::NodeName;
use serde_json::Value;

/// One frame's completed execution: the raw result plus the state as merged
/// by any delta-bearing part of it.
#[derive(Debug)]
pub struct FrameExecution {
    pub node: NodeName,
    /// The state the frame was dispatched with.
    pub state: GraphState,
    pub output: NodeOutput,
    /// `state` merged with the output's delta (Delta / Command update);
    /// identical to `state` for the other variants.
    pub merged: GraphState,
}

/// Faults surfaced by the superstep barrier.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// A node callable raised a fault; carries the node's name and step.
    #[error("node '{node}' failed at step {step}: {source}")]
    #[diagnostic(code(stepgraph::scheduler::node_run))]
    NodeRun {
        node: NodeName,
        step: u64,
        #[source]
        source: NodeError,
    },

    /// A frame referenced a node with no registered implementation.
    #[error("no implementation registered for node '{node}'")]
    #[diagnostic(code(stepgraph::scheduler::unregistered_node))]
    UnregisteredNode { node: NodeName },

    /// A worker task failed to join (panicked or was cancelled).
    #[error("superstep worker failed: {0}")]
    #[diagnostic(code(stepgraph::scheduler::join))]
    Join(#[from] tokio::task::JoinError),
}

/// Dispatches the frames of one superstep in parallel.
#[derive(Clone, Debug)]
pub struct Scheduler {
    limit: usize,
}

impl Scheduler {
    /// Create a scheduler with a concurrency cap (minimum 1).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    /// Worker count matching the host's available parallelism.
    #[must_use]
    pub fn default_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Execute every frame of one superstep concurrently and return their
    /// results in submission order.
    ///
    /// This is the BSP barrier: the future resolves only after every
    /// spawned task has finished. When a node faults, sibling tasks still
    /// run to completion and the first failure in submission order is
    /// returned.
    #[instrument(skip_all, fields(step = step, frames = frames.len()), err)]
    pub async fn run_step(
        &self,
        graph: &Graph,
        frames: Vec<ExecutionFrame>,
        step: u64,
        thread_id: &str,
        context: Option<Arc<Value>>,
        observers: &ObserverSet,
    ) -> Result<Vec<FrameExecution>, SchedulerError> {
        let total = frames.len();
        // Resolve every implementation up front so no task is dispatched and
        // then abandoned over a frame the graph cannot execute.
        let mut resolved = Vec::with_capacity(total);
        for frame in frames {
            let node_impl = graph
                .node_impl(&frame.node)
                .ok_or_else(|| SchedulerError::UnregisteredNode {
                    node: frame.node.clone(),
                })?;
            resolved.push((frame, node_impl));
        }

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut join_set: JoinSet<(usize, Result<FrameExecution, SchedulerError>)> = JoinSet::new();

        for (idx, (frame, node_impl)) in resolved.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let ctx = NodeContext {
                node: frame.node.clone(),
                step,
                thread_id: thread_id.to_string(),
                context: context.clone(),
                observers: observers.clone(),
            };
            let observers = observers.clone();

            join_set.spawn(async move {
                // The semaphore is never closed; a failed acquire only means
                // the cap is gone, not that the work should be skipped.
                let _permit = semaphore.acquire_owned().await.ok();
                let tag = node_impl.tag().to_string();
                observers.emit(RunEvent::NodeStart {
                    node: frame.node.clone(),
                    tag: tag.clone(),
                    step,
                    state_before: frame.state.snapshot(),
                });
                let started = Instant::now();
                match node_impl.run(&frame.state, &ctx).await {
                    Ok(output) => {
                        let merged = match &output {
                            NodeOutput::Delta(delta) => frame.state.merge(delta.clone()),
                            NodeOutput::Command(command) => match &command.update {
                                Some(update) => frame.state.merge(update.clone()),
                                None => frame.state.clone(),
                            },
                            _ => frame.state.clone(),
                        };
                        observers.emit(RunEvent::NodeEnd {
                            node: frame.node.clone(),
                            tag,
                            step,
                            state_before: frame.state.snapshot(),
                            state_after: merged.snapshot(),
                            result: output.clone(),
                            duration: started.elapsed(),
                        });
                        (
                            idx,
                            Ok(FrameExecution {
                                node: frame.node,
                                state: frame.state,
                                output,
                                merged,
                            }),
                        )
                    }
                    Err(error) => {
                        observers.emit(RunEvent::NodeError {
                            node: frame.node.clone(),
                            tag,
                            step,
                            state_before: frame.state.snapshot(),
                            error: error.to_string(),
                        });
                        (
                            idx,
                            Err(SchedulerError::NodeRun {
                                node: frame.node,
                                step,
                                source: error,
                            }),
                        )
                    }
                }
            });
        }

        // Barrier: drain every task before looking at any result.
        let mut slots: Vec<Option<Result<FrameExecution, SchedulerError>>> =
            (0..total).map(|_| None).collect();
        let mut join_failure: Option<SchedulerError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(join_error) => {
                    join_failure.get_or_insert(SchedulerError::Join(join_error));
                }
            }
        }

        if let Some(error) = join_failure {
            return Err(error);
        }
        // Every task joined cleanly, so every slot is filled; the first
        // failure in submission order wins.
        let mut executions = Vec::with_capacity(total);
        for result in slots.into_iter().flatten() {
            executions.push(result?);
        }
        Ok(executions)
    }
}
