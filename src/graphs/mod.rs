//! Graph construction: builder DSL, edge model, compile-time validation,
//! and diagram export.

pub mod builder;
pub mod compilation;
pub mod diagram;
pub mod edges;

pub use builder::GraphBuilder;
pub use edges::{route, Edge, LabelMap, RouteSelection, RouterFn};

use miette::Diagnostic;
use thiserror::Error;

/// Construction and validation faults.
///
/// These surface synchronously: either at [`GraphBuilder::compile`] or when
/// a resume call is missing its prerequisites.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// No edge leaves the synthetic Start endpoint.
    #[error("graph has no entry point: no edge leaves Start")]
    #[diagnostic(
        code(stepgraph::graphs::no_entry_point),
        help("Add set_entry_point(..) or an explicit edge from Start.")
    )]
    NoEntryPoint,

    /// An edge references a node that was never registered.
    #[error("unknown node '{node}' referenced by {referenced_by}")]
    #[diagnostic(
        code(stepgraph::graphs::unknown_node),
        help("Register the node with add_node(..) before wiring edges to it.")
    )]
    UnknownNode {
        node: String,
        referenced_by: String,
    },

    /// Two nodes were registered under the same name.
    #[error("duplicate node name '{name}'")]
    #[diagnostic(
        code(stepgraph::graphs::duplicate_node),
        help("Node names must be unique per graph.")
    )]
    DuplicateNode { name: String },

    /// A user node tried to claim a synthetic endpoint name.
    #[error("'{name}' is reserved for the synthetic endpoints")]
    #[diagnostic(
        code(stepgraph::graphs::reserved_node),
        help("Start and Finish are identity endpoints provided by the runtime.")
    )]
    ReservedNode { name: String },

    /// Resume was called without a store to load from.
    #[error("resume requires a checkpoint store")]
    #[diagnostic(
        code(stepgraph::graphs::resume_without_store),
        help("Pass the store that holds the thread's checkpoints in RunOptions.")
    )]
    ResumeWithoutStore,

    /// Resume was called for a thread with no checkpoints.
    #[error("no checkpoints found for thread '{thread_id}'")]
    #[diagnostic(
        code(stepgraph::graphs::unknown_thread),
        help("Run invoke(..) with this thread id first, or check the store.")
    )]
    UnknownThread { thread_id: String },
}
