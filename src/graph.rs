//! The compiled, executable workflow graph.
//!
//! A [`Graph`] is produced by [`GraphBuilder::compile`] and owns the node
//! registry, the edge list, the reducer table, and runtime defaults. It is
//! the factory for runners: every `invoke`/`stream`/`resume` call builds a
//! fresh runner so graphs can be shared (`Arc<Graph>`) across concurrent
//! runs with isolated threads, stores, and observers.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::control::{Interrupt, InterruptHandler};
use crate::graphs::diagram;
use crate::graphs::edges::Edge;
use crate::node::{IdentityNode, Node};
use crate::observers::{Observer, ObserverSet};
use crate::reducers::ReducerRegistry;
use crate::runtimes::runner::{GraphRunner, RunnerError, StepCallback};
use crate::runtimes::{RuntimeConfig, Scheduler, Store};
use crate::state::{GraphState, StateDelta};
use crate::types::NodeName;
use crate::utils::id_generator::IdGenerator;

/// Final result of a run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The terminal state (final state when a frame reached Finish, last
    /// known state otherwise).
    pub state: GraphState,
    /// Number of supersteps executed on this thread.
    pub step: u64,
    /// Thread the run executed under.
    pub thread_id: String,
}

/// Per-superstep summary yielded to `stream` callbacks.
#[derive(Clone, Debug)]
pub struct StepSummary {
    pub step: u64,
    /// The representative state checkpointed for this step.
    pub state: GraphState,
    /// Nodes active in the next superstep.
    pub active_nodes: Vec<NodeName>,
    /// `true` when the run terminates after this step.
    pub completed: bool,
}

/// Per-run parameters for `invoke`/`stream`/`resume`.
///
/// Unset fields fall back to the graph's [`RuntimeConfig`]: the store is
/// built from the configured store kind, and the thread id is generated.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub context: Option<Value>,
    pub store: Option<Arc<dyn Store>>,
    pub thread_id: Option<String>,
    pub observers: Vec<Arc<dyn Observer>>,
    pub interrupt_handler: Option<InterruptHandler>,
    pub max_steps: Option<u64>,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque caller context passed to nodes and routers.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Checkpoint store for this run.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Thread id for this run's checkpoint sequence.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Attach an observer sink.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register the interrupt handler: called when a node suspends, its
    /// returned delta is merged and the node re-runs.
    #[must_use]
    pub fn on_interrupt<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Interrupt) -> Option<StateDelta> + Send + Sync + 'static,
    {
        self.interrupt_handler = Some(Arc::new(handler));
        self
    }

    /// Guard against runaway cycles: fault after this many supersteps.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// Compiled workflow graph: validated topology plus runtime defaults.
#[derive(Clone)]
pub struct Graph {
    name: String,
    nodes: FxHashMap<NodeName, Arc<dyn Node>>,
    node_order: Vec<NodeName>,
    edges: Vec<Edge>,
    outgoing: FxHashMap<NodeName, Vec<usize>>,
    reducers: Arc<ReducerRegistry>,
    runtime_config: RuntimeConfig,
    identity: Arc<dyn Node>,
}

impl Graph {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        name: String,
        nodes: FxHashMap<NodeName, Arc<dyn Node>>,
        node_order: Vec<NodeName>,
        edges: Vec<Edge>,
        outgoing: FxHashMap<NodeName, Vec<usize>>,
        reducers: ReducerRegistry,
        runtime_config: RuntimeConfig,
    ) -> Self {
        Self {
            name,
            nodes,
            node_order,
            edges,
            outgoing,
            reducers: Arc::new(reducers),
            runtime_config,
            identity: Arc::new(IdentityNode),
        }
    }

    /// The graph's name, recorded in checkpoint metadata.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered node names in registration order.
    #[must_use]
    pub fn node_order(&self) -> &[NodeName] {
        &self.node_order
    }

    /// All edges in declaration order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Indices into [`edges`](Self::edges) of this node's outgoing edges,
    /// in declaration order.
    #[must_use]
    pub(crate) fn outgoing(&self, node: &NodeName) -> &[usize] {
        self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The executable behind a name: registered nodes for `Custom`, the
    /// identity node for the synthetic endpoints.
    #[must_use]
    pub(crate) fn node_impl(&self, node: &NodeName) -> Option<Arc<dyn Node>> {
        match node {
            NodeName::Start | NodeName::Finish => Some(Arc::clone(&self.identity)),
            NodeName::Custom(_) => self.nodes.get(node).cloned(),
        }
    }

    /// Returns `true` when `node` can be scheduled.
    #[must_use]
    pub(crate) fn knows(&self, node: &NodeName) -> bool {
        match node {
            NodeName::Start | NodeName::Finish => true,
            NodeName::Custom(_) => self.nodes.contains_key(node),
        }
    }

    /// The reducer table all states of this graph merge through.
    #[must_use]
    pub fn reducers(&self) -> &Arc<ReducerRegistry> {
        &self.reducers
    }

    /// Runtime defaults configured at build time.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Build the initial state for a run by merging `initial` into an empty
    /// state bound to this graph's reducers.
    #[must_use]
    pub fn initial_state(&self, initial: StateDelta) -> GraphState {
        GraphState::new(Arc::clone(&self.reducers)).merge(initial)
    }

    /// Execute until a frame reaches Finish or no frames remain; blocks the
    /// caller until termination.
    #[instrument(skip(self, initial, opts), fields(graph = %self.name), err)]
    pub async fn invoke(
        &self,
        initial: StateDelta,
        opts: RunOptions,
    ) -> Result<RunOutcome, RunnerError> {
        let runner = self.runner(opts);
        runner.run(self.initial_state(initial), None).await
    }

    /// Like [`invoke`](Self::invoke), yielding one [`StepSummary`] per
    /// superstep to `on_step`.
    #[instrument(skip(self, initial, opts, on_step), fields(graph = %self.name), err)]
    pub async fn stream<F>(
        &self,
        initial: StateDelta,
        opts: RunOptions,
        mut on_step: F,
    ) -> Result<RunOutcome, RunnerError>
    where
        F: FnMut(StepSummary) + Send,
    {
        let runner = self.runner(opts);
        let callback: StepCallback<'_> = &mut on_step;
        runner
            .run(self.initial_state(initial), Some(callback))
            .await
    }

    /// Load the latest checkpoint for `thread_id`, merge `extra`, and
    /// continue. Requires a store; the thread must have checkpoints.
    #[instrument(skip(self, extra, opts), fields(graph = %self.name), err)]
    pub async fn resume(
        &self,
        thread_id: &str,
        extra: StateDelta,
        opts: RunOptions,
    ) -> Result<RunOutcome, RunnerError> {
        if opts.store.is_none() {
            return Err(crate::graphs::GraphError::ResumeWithoutStore.into());
        }
        let opts = RunOptions {
            thread_id: Some(thread_id.to_string()),
            ..opts
        };
        let runner = self.runner(opts);
        runner.resume(extra, None).await
    }

    /// Render the compiled topology as a Mermaid flowchart.
    #[must_use]
    pub fn to_mermaid(&self) -> String {
        diagram::render_mermaid(self)
    }

    fn runner(&self, opts: RunOptions) -> GraphRunner<'_> {
        let store = opts
            .store
            .unwrap_or_else(|| self.runtime_config.build_store());
        let thread_id = opts
            .thread_id
            .or_else(|| self.runtime_config.thread_id.clone())
            .unwrap_or_else(|| IdGenerator::new().generate_thread_id());
        GraphRunner::new(
            self,
            store,
            thread_id,
            ObserverSet::new(opts.observers),
            opts.context.map(Arc::new),
            opts.interrupt_handler,
            Scheduler::new(Scheduler::default_parallelism()),
            opts.max_steps.or(self.runtime_config.max_steps),
        )
    }
}
