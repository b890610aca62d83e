//! Edge variants and routing predicates.
//!
//! Three edge kinds share a source node: static edges name a single fixed
//! destination, conditional edges evaluate a pure router over the current
//! state, and fan-out edges take a fixed list of destinations
//! simultaneously. Edges are kept in declaration order because the runner
//! enqueues frames in that order when several edges fire from one node.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::node::RunContext;
use crate::state::GraphState;
use crate::types::NodeName;

/// Router for conditional edges.
///
/// Routers observe the state and must not mutate it; running a router twice
/// on the same state must yield the same destinations.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use stepgraph::graphs::RouterFn;
///
/// let by_sign: RouterFn = Arc::new(|state, _ctx| {
///     if state.get("number").and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
///         "positive".into()
///     } else {
///         "other".into()
///     }
/// });
/// # drop(by_sign);
/// ```
pub type RouterFn = Arc<dyn Fn(&GraphState, &RunContext) -> RouteSelection + Send + Sync>;

/// Optional `label → destination` table applied to router output.
pub type LabelMap = FxHashMap<String, String>;

/// What a router returned: one destination token or an ordered sequence.
///
/// Scalars are coerced to one-element sequences during routing, so routers
/// can return `"next".into()` or a full `vec![...]` interchangeably.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteSelection {
    One(String),
    Many(Vec<String>),
}

impl RouteSelection {
    /// Flatten into an ordered token sequence.
    #[must_use]
    pub fn into_tokens(self) -> Vec<String> {
        match self {
            RouteSelection::One(token) => vec![token],
            RouteSelection::Many(tokens) => tokens,
        }
    }
}

impl From<&str> for RouteSelection {
    fn from(token: &str) -> Self {
        RouteSelection::One(token.to_string())
    }
}

impl From<String> for RouteSelection {
    fn from(token: String) -> Self {
        RouteSelection::One(token)
    }
}

impl From<NodeName> for RouteSelection {
    fn from(node: NodeName) -> Self {
        RouteSelection::One(node.encode())
    }
}

impl From<Vec<String>> for RouteSelection {
    fn from(tokens: Vec<String>) -> Self {
        RouteSelection::Many(tokens)
    }
}

impl From<Vec<&str>> for RouteSelection {
    fn from(tokens: Vec<&str>) -> Self {
        RouteSelection::Many(tokens.into_iter().map(str::to_string).collect())
    }
}

/// A directed edge out of a node.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge to a single destination.
    Static { from: NodeName, to: NodeName },
    /// Router-driven edge; destinations are computed from state at route
    /// time and optionally remapped through a label table.
    Conditional {
        from: NodeName,
        router: RouterFn,
        labels: Option<LabelMap>,
    },
    /// All destinations taken simultaneously.
    FanOut { from: NodeName, to: Vec<NodeName> },
}

impl Edge {
    /// The source node of this edge.
    #[must_use]
    pub fn source(&self) -> &NodeName {
        match self {
            Edge::Static { from, .. } | Edge::Conditional { from, .. } | Edge::FanOut { from, .. } => {
                from
            }
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static { from, to } => f
                .debug_struct("Static")
                .field("from", from)
                .field("to", to)
                .finish(),
            Edge::Conditional { from, labels, .. } => f
                .debug_struct("Conditional")
                .field("from", from)
                .field("labels", labels)
                .finish_non_exhaustive(),
            Edge::FanOut { from, to } => f
                .debug_struct("FanOut")
                .field("from", from)
                .field("to", to)
                .finish(),
        }
    }
}

/// Evaluate one edge into an ordered destination list.
///
/// Pure and side-effect free. For conditional edges the router output is
/// coerced to a token sequence, each token is passed through the label map
/// (unmapped tokens pass through as-is), and the result is normalized to
/// node names.
#[must_use]
pub fn route(edge: &Edge, state: &GraphState, ctx: &RunContext) -> Vec<NodeName> {
    match edge {
        Edge::Static { to, .. } => vec![to.clone()],
        Edge::FanOut { to, .. } => to.clone(),
        Edge::Conditional { router, labels, .. } => router(state, ctx)
            .into_tokens()
            .into_iter()
            .map(|token| {
                let mapped = labels
                    .as_ref()
                    .and_then(|table| table.get(&token).cloned())
                    .unwrap_or(token);
                NodeName::decode(&mapped)
            })
            .collect(),
    }
}
