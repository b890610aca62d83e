//! Fluent builder for workflow graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{Edge, LabelMap, RouterFn};
use crate::clients::{ChatClient, ChatNode, Tool, ToolNode};
use crate::control::NodeOutput;
use crate::node::{FnNode, Node, NodeContext, NodeError};
use crate::reducers::{Reducer, ReducerRegistry};
use crate::runtimes::RuntimeConfig;
use crate::state::GraphState;
use crate::types::NodeName;

/// Builder for constructing workflow graphs.
///
/// Add nodes and edges, register reducers, then call
/// [`compile`](Self::compile) to validate the topology and obtain an
/// executable [`Graph`](crate::graph::Graph). Only a compiled graph exposes
/// `invoke`/`stream`/`resume`, so an unvalidated graph cannot be run.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use stepgraph::graphs::GraphBuilder;
/// use stepgraph::state::delta;
///
/// let graph = GraphBuilder::new()
///     .add_node_fn("double", |state, _ctx| {
///         let n = state.get("number").and_then(|v| v.as_i64()).unwrap_or(0);
///         Ok(delta([("result", json!(n * 2))]).into())
///     })
///     .set_entry_point("double")
///     .set_finish_point("double")
///     .compile()
///     .expect("valid graph");
/// # drop(graph);
/// ```
pub struct GraphBuilder {
    pub(super) name: String,
    pub(super) nodes: FxHashMap<NodeName, Arc<dyn Node>>,
    pub(super) node_order: Vec<NodeName>,
    pub(super) edges: Vec<Edge>,
    pub(super) reducers: ReducerRegistry,
    pub(super) runtime_config: RuntimeConfig,
    pub(super) duplicate_names: Vec<String>,
    pub(super) reserved_names: Vec<String>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "workflow".to_string(),
            nodes: FxHashMap::default(),
            node_order: Vec::new(),
            edges: Vec::new(),
            reducers: ReducerRegistry::new(),
            runtime_config: RuntimeConfig::default(),
            duplicate_names: Vec::new(),
            reserved_names: Vec::new(),
        }
    }

    /// Name the graph; recorded in checkpoint metadata and diagrams.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a node under a graph-unique name.
    ///
    /// `Start` and `Finish` are synthetic endpoints and cannot be
    /// registered; duplicates are rejected at compile time.
    #[must_use]
    pub fn add_node(mut self, id: impl Into<NodeName>, node: impl Node + 'static) -> Self {
        let id = id.into();
        match &id {
            NodeName::Start | NodeName::Finish => {
                self.reserved_names.push(id.encode());
            }
            NodeName::Custom(name) => {
                if self.nodes.contains_key(&id) {
                    self.duplicate_names.push(name.clone());
                } else {
                    self.node_order.push(id.clone());
                    self.nodes.insert(id, Arc::new(node));
                }
            }
        }
        self
    }

    /// Register a closure as a node.
    #[must_use]
    pub fn add_node_fn<F>(self, id: impl Into<NodeName>, func: F) -> Self
    where
        F: Fn(&GraphState, &NodeContext) -> Result<NodeOutput, NodeError> + Send + Sync + 'static,
    {
        self.add_node(id, FnNode::new(func))
    }

    /// Register a chat-model node delegating to an external client.
    #[must_use]
    pub fn add_chat_node(
        self,
        id: impl Into<NodeName>,
        client: Arc<dyn ChatClient>,
        system_prompt: Option<&str>,
    ) -> Self {
        let mut node = ChatNode::new(client);
        if let Some(prompt) = system_prompt {
            node = node.with_system_prompt(prompt);
        }
        self.add_node(id, node)
    }

    /// Register a tool-executing node.
    #[must_use]
    pub fn add_tool_node(self, id: impl Into<NodeName>, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.add_node(id, ToolNode::new(tools))
    }

    /// Add an unconditional edge.
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.edges.push(Edge::Static {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add a router-driven edge. Destinations are computed from state at
    /// route time; unknown targets fault the run when routed to.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: impl Into<NodeName>, router: RouterFn) -> Self {
        self.edges.push(Edge::Conditional {
            from: from.into(),
            router,
            labels: None,
        });
        self
    }

    /// Add a router-driven edge whose output tokens are remapped through a
    /// label table before normalization. Unmapped tokens pass through.
    #[must_use]
    pub fn add_conditional_edge_with_labels(
        mut self,
        from: impl Into<NodeName>,
        router: RouterFn,
        labels: LabelMap,
    ) -> Self {
        self.edges.push(Edge::Conditional {
            from: from.into(),
            router,
            labels: Some(labels),
        });
        self
    }

    /// Add a fan-out edge: all destinations are taken simultaneously.
    #[must_use]
    pub fn add_fan_out_edge(
        mut self,
        from: impl Into<NodeName>,
        to: Vec<NodeName>,
    ) -> Self {
        self.edges.push(Edge::FanOut {
            from: from.into(),
            to,
        });
        self
    }

    /// Shorthand for `add_edge(Start, name)`.
    #[must_use]
    pub fn set_entry_point(self, name: impl Into<NodeName>) -> Self {
        self.add_edge(NodeName::Start, name)
    }

    /// Shorthand for `add_edge(name, Finish)`.
    #[must_use]
    pub fn set_finish_point(self, name: impl Into<NodeName>) -> Self {
        self.add_edge(name, NodeName::Finish)
    }

    /// Register a reducer for a state key.
    #[must_use]
    pub fn with_reducer(mut self, key: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.reducers = self.reducers.with_reducer(key, reducer);
        self
    }

    /// Configure runtime defaults (thread ids, store choice, step guard).
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }
}
