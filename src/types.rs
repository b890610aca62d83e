//! Core identifiers for workflow graphs.
//!
//! [`NodeName`] identifies a node within a graph. The synthetic `Start` and
//! `Finish` endpoints are always present in every compiled graph: both are
//! identity functions on state, `Start` seeds execution and `Finish` marks a
//! terminal frame. User nodes are `Custom` and must be unique per graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// # Persistence
///
/// `NodeName` supports serde for checkpoint metadata as well as the
/// [`encode`](Self::encode)/[`decode`](Self::decode) pair used for the
/// plain-string form. Because `Start`/`Finish` are reserved at compile time,
/// the plain form is unambiguous.
///
/// # Examples
///
/// ```rust
/// use stepgraph::types::NodeName;
///
/// let node = NodeName::Custom("double".to_string());
/// assert_eq!(node.encode(), "double");
/// assert_eq!(NodeName::decode("double"), node);
/// assert_eq!(NodeName::decode("Finish"), NodeName::Finish);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeName {
    /// Synthetic entry point. Executed as an identity node in the first
    /// superstep of a fresh run; never registered by users.
    Start,

    /// Synthetic terminal. A frame routed or sent here ends the run with its
    /// merged state; never registered by users.
    Finish,

    /// User-registered node, identified by a graph-unique string.
    Custom(String),
}

impl NodeName {
    /// Plain-string form used in checkpoint metadata and diagrams.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeName::Start => "Start".to_string(),
            NodeName::Finish => "Finish".to_string(),
            NodeName::Custom(name) => name.clone(),
        }
    }

    /// Inverse of [`encode`](Self::encode).
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeName::Start,
            "Finish" => NodeName::Finish,
            other => NodeName::Custom(other.to_string()),
        }
    }

    /// Returns `true` for the synthetic `Start` endpoint.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns `true` for the synthetic `Finish` endpoint.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// Returns `true` for a user-registered node.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::Finish => write!(f, "Finish"),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

// Allow string literals wherever a NodeName is expected.
impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        NodeName::decode(s)
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        NodeName::decode(&s)
    }
}
