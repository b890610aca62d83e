//! The BSP super-step loop.
//!
//! A runner owns one execution: the compiled graph, a store, a thread id,
//! the observer set, and an optional interrupt handler. Execution advances
//! in supersteps — dispatch all active frames in parallel, process each
//! result into next frames (or a final state), write a checkpoint, notify
//! observers, yield to the stream callback — until a frame reaches Finish
//! or no frames remain.

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

use super::checkpoint::{Checkpoint, Store, StoreError, ACTIVE_NODES_KEY, INTERRUPTED_KEY};
use super::scheduler::{FrameExecution, Scheduler, SchedulerError};
use crate::control::{InterruptHandler, NodeOutput};
use crate::graph::{Graph, RunOutcome, StepSummary};
use crate::graphs::edges::route;
use crate::graphs::GraphError;
use crate::node::RunContext;
use crate::observers::{ObserverSet, RunEvent};
use crate::state::{GraphState, StateDelta};
use crate::types::NodeName;

/// Scheduled execution unit: one node invocation with its own state view.
///
/// Frames are born when a superstep's results are processed and die when the
/// next superstep executes them; each is consumed by exactly one invocation.
#[derive(Clone, Debug)]
pub struct ExecutionFrame {
    pub node: NodeName,
    pub state: GraphState,
    /// Superstep at the end of which this frame was created.
    pub step: u64,
}

/// Callback receiving one [`StepSummary`] per superstep.
pub type StepCallback<'a> = &'a mut (dyn FnMut(StepSummary) + Send);

/// Faults raised by the runner.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    /// A route produced a destination with no registered node.
    #[error("route from '{from}' targets unknown node '{to}'")]
    #[diagnostic(
        code(stepgraph::runner::unknown_route_target),
        help("Conditional routes are validated when taken; register the node or fix the router.")
    )]
    UnknownRouteTarget { from: NodeName, to: String },

    /// The optional cycle guard tripped.
    #[error("superstep limit of {limit} exceeded")]
    #[diagnostic(
        code(stepgraph::runner::step_limit),
        help("The graph likely cycles without reaching Finish; raise the limit or fix the routing.")
    )]
    StepLimitExceeded { limit: u64 },
}

/// Outcome of processing one superstep's results.
struct StepOutcome {
    next: Vec<ExecutionFrame>,
    final_state: Option<GraphState>,
    interrupted: Option<NodeName>,
}

/// Drives one execution of a compiled graph.
pub(crate) struct GraphRunner<'g> {
    graph: &'g Graph,
    store: Arc<dyn Store>,
    thread_id: String,
    observers: ObserverSet,
    context: Option<Arc<Value>>,
    interrupt_handler: Option<InterruptHandler>,
    scheduler: Scheduler,
    max_steps: Option<u64>,
}

impl<'g> GraphRunner<'g> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: &'g Graph,
        store: Arc<dyn Store>,
        thread_id: String,
        observers: ObserverSet,
        context: Option<Arc<Value>>,
        interrupt_handler: Option<InterruptHandler>,
        scheduler: Scheduler,
        max_steps: Option<u64>,
    ) -> Self {
        Self {
            graph,
            store,
            thread_id,
            observers,
            context,
            interrupt_handler,
            scheduler,
            max_steps,
        }
    }

    /// Run a fresh execution seeded at Start.
    pub(crate) async fn run(
        &self,
        initial: GraphState,
        on_step: Option<StepCallback<'_>>,
    ) -> Result<RunOutcome, RunnerError> {
        self.observers.emit(RunEvent::GraphStart {
            graph: self.graph.name().to_string(),
            thread_id: self.thread_id.clone(),
            state: initial.snapshot(),
            context: self.context.as_deref().cloned(),
        });
        let seed = ExecutionFrame {
            node: NodeName::Start,
            state: initial.clone(),
            step: 0,
        };
        let seed_result = self
            .save_checkpoint(0, &initial, &[NodeName::Start], false)
            .await;
        match seed_result {
            Ok(()) => self.drive(vec![seed], 0, initial, on_step).await,
            Err(error) => {
                self.finish_events(&initial);
                Err(error)
            }
        }
    }

    /// Continue from the latest checkpoint of this runner's thread.
    pub(crate) async fn resume(
        &self,
        extra: StateDelta,
        on_step: Option<StepCallback<'_>>,
    ) -> Result<RunOutcome, RunnerError> {
        let checkpoint = self
            .store
            .load(&self.thread_id, None)
            .await?
            .ok_or_else(|| GraphError::UnknownThread {
                thread_id: self.thread_id.clone(),
            })?;
        let restored =
            GraphState::from_entries(Arc::clone(self.graph.reducers()), checkpoint.state.clone())
                .merge(extra);
        let active = checkpoint.active_nodes();

        // A step-0 checkpoint (or one without pending nodes) restarts from
        // Start; anything else picks up exactly where the thread paused.
        if checkpoint.step == 0 || active.is_empty() || active.iter().all(NodeName::is_start) {
            return self.run(restored, on_step).await;
        }

        self.observers.emit(RunEvent::GraphStart {
            graph: self.graph.name().to_string(),
            thread_id: self.thread_id.clone(),
            state: restored.snapshot(),
            context: self.context.as_deref().cloned(),
        });
        let frames = active
            .into_iter()
            .map(|node| ExecutionFrame {
                node,
                state: restored.clone(),
                step: checkpoint.step,
            })
            .collect();
        self.drive(frames, checkpoint.step, restored, on_step).await
    }

    /// The superstep loop. Emits `graph_end` (and `shutdown`) on every exit
    /// path, success or fault.
    #[instrument(skip_all, fields(thread_id = %self.thread_id, start_step = start_step), err)]
    async fn drive(
        &self,
        frames: Vec<ExecutionFrame>,
        start_step: u64,
        last_state: GraphState,
        mut on_step: Option<StepCallback<'_>>,
    ) -> Result<RunOutcome, RunnerError> {
        let mut active = frames;
        let mut step = start_step;
        let mut last_state = last_state;

        let result = loop {
            if active.is_empty() {
                break Ok(None);
            }
            if let Some(limit) = self.max_steps {
                if step - start_step >= limit {
                    break Err(RunnerError::StepLimitExceeded { limit });
                }
            }

            let exec_step = step + 1;
            let step_started = Instant::now();
            let executions = match self
                .scheduler
                .run_step(
                    self.graph,
                    active,
                    exec_step,
                    &self.thread_id,
                    self.context.clone(),
                    &self.observers,
                )
                .await
            {
                Ok(executions) => executions,
                Err(error) => break Err(RunnerError::Scheduler(error)),
            };
            step = exec_step;

            let outcome = match self.process_results(executions, step) {
                Ok(outcome) => outcome,
                Err(error) => break Err(error),
            };

            let representative = outcome
                .final_state
                .clone()
                .or_else(|| outcome.next.first().map(|f| f.state.clone()))
                .unwrap_or_else(|| last_state.clone());
            let active_names: Vec<NodeName> =
                outcome.next.iter().map(|f| f.node.clone()).collect();
            // Pending nodes recorded for resume: the interrupted node when an
            // unhandled interrupt stopped the run, nothing once a final state
            // exists, the next frontier otherwise.
            let pending: Vec<NodeName> = match &outcome.interrupted {
                Some(node) => vec![node.clone()],
                None if outcome.final_state.is_some() => Vec::new(),
                None => active_names.clone(),
            };
            if let Err(error) = self
                .save_checkpoint(step, &representative, &pending, outcome.interrupted.is_some())
                .await
            {
                last_state = representative;
                break Err(error);
            }

            let completed = outcome.final_state.is_some() || outcome.next.is_empty();
            self.observers.emit(RunEvent::StepComplete {
                step,
                active_nodes: active_names.clone(),
                state: representative.snapshot(),
                duration: step_started.elapsed(),
            });
            if let Some(callback) = on_step.as_deref_mut() {
                callback(StepSummary {
                    step,
                    state: representative.clone(),
                    active_nodes: active_names,
                    completed,
                });
            }

            last_state = representative;
            if let Some(final_state) = outcome.final_state {
                // Non-terminal frames produced in the same superstep are
                // discarded once a final state exists.
                break Ok(Some(final_state));
            }
            active = outcome.next;
        };

        match result {
            Ok(final_state) => {
                let state = final_state.unwrap_or(last_state);
                self.finish_events(&state);
                Ok(RunOutcome {
                    state,
                    step,
                    thread_id: self.thread_id.clone(),
                })
            }
            Err(error) => {
                self.finish_events(&last_state);
                Err(error)
            }
        }
    }

    /// Translate one superstep's results into next frames and, possibly, a
    /// final state.
    fn process_results(
        &self,
        executions: Vec<FrameExecution>,
        step: u64,
    ) -> Result<StepOutcome, RunnerError> {
        let mut outcome = StepOutcome {
            next: Vec::new(),
            final_state: None,
            interrupted: None,
        };
        let run_ctx = RunContext {
            step,
            thread_id: self.thread_id.clone(),
            context: self.context.clone(),
        };

        for execution in executions {
            let FrameExecution {
                node,
                state,
                output,
                merged,
            } = execution;

            // A frame that executed at Finish is terminal: its state becomes
            // (or folds into) the final state.
            if node.is_finish() {
                Self::fold_final(&mut outcome.final_state, merged, &StateDelta::default());
                continue;
            }

            match output {
                NodeOutput::Delta(delta) => {
                    self.route_and_enqueue(&node, &merged, &delta, step, &run_ctx, &mut outcome)?;
                }
                NodeOutput::Command(command) => {
                    let delta = command.update.clone().unwrap_or_default();
                    match &command.goto {
                        Some(goto) => {
                            self.enqueue(&node, goto.clone(), merged, &delta, step, &mut outcome)?;
                        }
                        None => {
                            self.route_and_enqueue(
                                &node, &merged, &delta, step, &run_ctx, &mut outcome,
                            )?;
                        }
                    }
                    self.observers.emit(RunEvent::CommandProcessed {
                        node,
                        step,
                        goto: command.goto,
                    });
                }
                NodeOutput::Send(dispatch) => {
                    self.enqueue_send(&node, &state, dispatch, step, &mut outcome)?;
                }
                NodeOutput::MultiSend(dispatches) => {
                    for dispatch in dispatches {
                        self.enqueue_send(&node, &state, dispatch, step, &mut outcome)?;
                    }
                }
                NodeOutput::Interrupt(interrupt) => match &self.interrupt_handler {
                    Some(handler) => {
                        let injected = handler(&interrupt).unwrap_or_default();
                        outcome.next.push(ExecutionFrame {
                            node: node.clone(),
                            state: state.merge(injected),
                            step,
                        });
                        self.observers.emit(RunEvent::Interrupted {
                            node,
                            step,
                            message: interrupt.message,
                            data: interrupt.data,
                            resumed: true,
                        });
                    }
                    None => {
                        if outcome.final_state.is_none() {
                            outcome.final_state = Some(state.clone());
                        }
                        outcome.interrupted = Some(node.clone());
                        self.observers.emit(RunEvent::Interrupted {
                            node,
                            step,
                            message: interrupt.message,
                            data: interrupt.data,
                            resumed: false,
                        });
                    }
                },
            }
        }
        Ok(outcome)
    }

    /// Evaluate the source node's edges and enqueue every destination.
    fn route_and_enqueue(
        &self,
        source: &NodeName,
        merged: &GraphState,
        delta: &StateDelta,
        step: u64,
        run_ctx: &RunContext,
        outcome: &mut StepOutcome,
    ) -> Result<(), RunnerError> {
        for destination in self.destinations(source, merged, run_ctx) {
            self.enqueue(source, destination, merged.clone(), delta, step, outcome)?;
        }
        Ok(())
    }

    /// Destinations of a node's outgoing edges, in declaration order. A node
    /// without outgoing edges defaults to Finish.
    fn destinations(
        &self,
        source: &NodeName,
        state: &GraphState,
        run_ctx: &RunContext,
    ) -> Vec<NodeName> {
        let indices = self.graph.outgoing(source);
        if indices.is_empty() {
            return vec![NodeName::Finish];
        }
        let edges = self.graph.edges();
        indices
            .iter()
            .flat_map(|&idx| route(&edges[idx], state, run_ctx))
            .collect()
    }

    /// Enqueue one routed destination: Finish folds into the final state,
    /// anything else becomes a next-step frame.
    fn enqueue(
        &self,
        source: &NodeName,
        destination: NodeName,
        merged: GraphState,
        delta: &StateDelta,
        step: u64,
        outcome: &mut StepOutcome,
    ) -> Result<(), RunnerError> {
        if destination.is_finish() {
            Self::fold_final(&mut outcome.final_state, merged, delta);
            return Ok(());
        }
        if !self.graph.knows(&destination) {
            return Err(RunnerError::UnknownRouteTarget {
                from: source.clone(),
                to: destination.encode(),
            });
        }
        outcome.next.push(ExecutionFrame {
            node: destination,
            state: merged,
            step,
        });
        Ok(())
    }

    /// Sends schedule frames unconditionally — the sender's edges are not
    /// evaluated, and a Finish target becomes a frame that terminates on the
    /// following step.
    fn enqueue_send(
        &self,
        source: &NodeName,
        state: &GraphState,
        dispatch: crate::control::Dispatch,
        step: u64,
        outcome: &mut StepOutcome,
    ) -> Result<(), RunnerError> {
        if !self.graph.knows(&dispatch.to) {
            return Err(RunnerError::UnknownRouteTarget {
                from: source.clone(),
                to: dispatch.to.encode(),
            });
        }
        outcome.next.push(ExecutionFrame {
            node: dispatch.to,
            state: state.merge(dispatch.payload),
            step,
        });
        Ok(())
    }

    /// Fold one FINISH arrival into the final state: the first arrival sets
    /// it, later arrivals merge their delta through the reducers so parallel
    /// branches accumulate.
    fn fold_final(final_state: &mut Option<GraphState>, merged: GraphState, delta: &StateDelta) {
        match final_state {
            None => *final_state = Some(merged),
            Some(existing) => *existing = existing.merge(delta.clone()),
        }
    }

    async fn save_checkpoint(
        &self,
        step: u64,
        state: &GraphState,
        active_nodes: &[NodeName],
        interrupted: bool,
    ) -> Result<(), RunnerError> {
        let mut metadata: FxHashMap<String, Value> = FxHashMap::default();
        metadata.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        metadata.insert("graph".to_string(), json!(self.graph.name()));
        metadata.insert(
            ACTIVE_NODES_KEY.to_string(),
            json!(active_nodes.iter().map(NodeName::encode).collect::<Vec<_>>()),
        );
        if interrupted {
            metadata.insert(INTERRUPTED_KEY.to_string(), json!(true));
        }
        self.store
            .save(Checkpoint {
                thread_id: self.thread_id.clone(),
                step,
                state: state.snapshot(),
                created_at: Utc::now(),
                metadata,
            })
            .await?;
        self.observers.emit(RunEvent::CheckpointSaved {
            thread_id: self.thread_id.clone(),
            step,
        });
        Ok(())
    }

    fn finish_events(&self, state: &GraphState) {
        self.observers.emit(RunEvent::GraphEnd {
            thread_id: self.thread_id.clone(),
            state: state.snapshot(),
        });
        self.observers.emit(RunEvent::Shutdown);
    }
}
