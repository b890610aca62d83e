//! ```text
//! GraphBuilder ─┬─► compile ─► Graph ─► GraphRunner
//!               │                       │
//!               │                       ├─► Scheduler ─► Nodes ─► NodeOutput
//!               │                       │                         │
//!               │                       │                         ├─► Reducers → GraphState
//!               │                       │                         └─► Observers (lifecycle / LLM)
//!               │                       │
//!               │                       └─► Store (InMemory / JSON / YAML files)
//!               │
//!               └─► ReducerRegistry & RuntimeConfig wire behaviour end-to-end
//! ```
//!
//! Stepgraph is a framework for running stateful, multi-actor workflows as
//! directed graphs. Each execution advances in bulk-synchronous supersteps:
//! all active frames run in parallel, their state deltas merge through
//! per-key reducers, results route through static, conditional, or fan-out
//! edges, a checkpoint is written, and the observer set is notified. Runs
//! can pause on interrupts and resume deterministically from a persisted
//! checkpoint.

pub mod clients;
pub mod control;
pub mod graph;
pub mod graphs;
pub mod node;
pub mod observers;
pub mod reducers;
pub mod runtimes;
pub mod state;
pub mod types;
pub mod utils;
