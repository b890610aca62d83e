//! Compile-time validation turning a builder into an executable graph.

use rustc_hash::{FxHashMap, FxHashSet};

use super::edges::Edge;
use super::GraphError;
use crate::graph::Graph;
use crate::types::NodeName;

impl super::builder::GraphBuilder {
    /// Validate the topology and produce an executable
    /// [`Graph`](crate::graph::Graph).
    ///
    /// Checks performed:
    /// - `Start` has at least one outgoing edge ([`GraphError::NoEntryPoint`])
    /// - every static edge target and fan-out destination exists
    ///   ([`GraphError::UnknownNode`]); conditional targets are validated
    ///   lazily at route time
    /// - node names are unique and do not claim the synthetic endpoints
    ///
    /// Two non-fatal conditions are reported through `tracing::warn!`: nodes
    /// with no incoming static or fan-out edge (they may still be reached
    /// dynamically), and the absence of a statically-provable path from
    /// Start to Finish.
    pub fn compile(self) -> Result<Graph, GraphError> {
        if let Some(name) = self.reserved_names.first() {
            return Err(GraphError::ReservedNode { name: name.clone() });
        }
        if let Some(name) = self.duplicate_names.first() {
            return Err(GraphError::DuplicateNode { name: name.clone() });
        }

        if !self.edges.iter().any(|e| e.source().is_start()) {
            return Err(GraphError::NoEntryPoint);
        }

        let known = |node: &NodeName| -> bool {
            match node {
                NodeName::Start | NodeName::Finish => true,
                NodeName::Custom(_) => self.nodes.contains_key(node),
            }
        };

        for edge in &self.edges {
            let from = edge.source();
            if !known(from) {
                return Err(GraphError::UnknownNode {
                    node: from.encode(),
                    referenced_by: "an edge source".to_string(),
                });
            }
            match edge {
                Edge::Static { from, to } => {
                    if !known(to) {
                        return Err(GraphError::UnknownNode {
                            node: to.encode(),
                            referenced_by: format!("the edge from '{from}'"),
                        });
                    }
                }
                Edge::FanOut { from, to } => {
                    for target in to {
                        if !known(target) {
                            return Err(GraphError::UnknownNode {
                                node: target.encode(),
                                referenced_by: format!("the fan-out edge from '{from}'"),
                            });
                        }
                    }
                }
                Edge::Conditional { .. } => {}
            }
        }

        warn_on_structural_gaps(&self.node_order, &self.edges);

        let mut outgoing: FxHashMap<NodeName, Vec<usize>> = FxHashMap::default();
        for (idx, edge) in self.edges.iter().enumerate() {
            outgoing.entry(edge.source().clone()).or_default().push(idx);
        }

        Ok(Graph::from_parts(
            self.name,
            self.nodes,
            self.node_order,
            self.edges,
            outgoing,
            self.reducers,
            self.runtime_config,
        ))
    }
}

/// Static destinations of an edge (conditional edges contribute nothing).
fn static_targets(edge: &Edge) -> Vec<&NodeName> {
    match edge {
        Edge::Static { to, .. } => vec![to],
        Edge::FanOut { to, .. } => to.iter().collect(),
        Edge::Conditional { .. } => Vec::new(),
    }
}

fn warn_on_structural_gaps(node_order: &[NodeName], edges: &[Edge]) {
    let mut has_incoming: FxHashSet<&NodeName> = FxHashSet::default();
    for edge in edges {
        has_incoming.extend(static_targets(edge));
    }
    for node in node_order {
        if !has_incoming.contains(node) {
            tracing::warn!(
                node = %node,
                "node has no incoming static or fan-out edge; it is only reachable dynamically, if at all"
            );
        }
    }

    // BFS over static reachability from Start.
    let mut reached: FxHashSet<NodeName> = FxHashSet::default();
    let mut frontier = vec![NodeName::Start];
    while let Some(current) = frontier.pop() {
        if !reached.insert(current.clone()) {
            continue;
        }
        for edge in edges.iter().filter(|e| e.source() == &current) {
            for target in static_targets(edge) {
                if !reached.contains(target) {
                    frontier.push(target.clone());
                }
            }
        }
    }
    if !reached.contains(&NodeName::Finish) {
        tracing::warn!(
            "no statically-provable path from Start to Finish; termination depends on dynamic routing"
        );
    }
}
