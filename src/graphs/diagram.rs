//! Text rendering of a compiled graph as a Mermaid flowchart.
//!
//! The output is advisory: it shows nodes, static edges, conditional branch
//! points with their labels, and fan-out destinations. Conditional edges
//! without a label table render as a dashed edge into a decision marker,
//! since their destinations are only known at route time.

use crate::graph::Graph;
use crate::graphs::edges::Edge;
use crate::types::NodeName;

pub(crate) fn render_mermaid(graph: &Graph) -> String {
    let mut out = String::from("flowchart TD\n");
    out.push_str("    __start__((Start))\n");
    out.push_str("    __finish__((Finish))\n");
    for node in graph.node_order() {
        out.push_str(&format!("    {}[\"{}\"]\n", mermaid_id(node), node));
    }

    for (idx, edge) in graph.edges().iter().enumerate() {
        match edge {
            Edge::Static { from, to } => {
                out.push_str(&format!("    {} --> {}\n", mermaid_id(from), mermaid_id(to)));
            }
            Edge::FanOut { from, to } => {
                for target in to {
                    out.push_str(&format!(
                        "    {} --> {}\n",
                        mermaid_id(from),
                        mermaid_id(target)
                    ));
                }
            }
            Edge::Conditional { from, labels, .. } => match labels {
                Some(table) => {
                    let mut entries: Vec<_> = table.iter().collect();
                    entries.sort();
                    for (label, target) in entries {
                        out.push_str(&format!(
                            "    {} -.->|{}| {}\n",
                            mermaid_id(from),
                            label,
                            mermaid_id(&NodeName::decode(target))
                        ));
                    }
                }
                None => {
                    let marker = format!("{}_route_{}", mermaid_id(from), idx);
                    out.push_str(&format!("    {}{{\"?\"}}\n", marker));
                    out.push_str(&format!("    {} -.-> {}\n", mermaid_id(from), marker));
                }
            },
        }
    }
    out
}

fn mermaid_id(node: &NodeName) -> String {
    match node {
        NodeName::Start => "__start__".to_string(),
        NodeName::Finish => "__finish__".to_string(),
        NodeName::Custom(name) => name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect(),
    }
}
