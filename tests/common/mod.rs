#![allow(dead_code)]

pub mod nodes;

use serde_json::json;
use std::sync::Arc;

use stepgraph::graph::RunOptions;
use stepgraph::observers::MemoryObserver;
use stepgraph::reducers::{FnReducer, Reducer};

/// Numeric `+` reducer used by the accumulation scenarios.
pub fn sum_reducer() -> impl Reducer {
    FnReducer::new(|old, new| {
        json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + new.as_i64().unwrap_or(0))
    })
}

/// Run options with a memory observer attached, returning both.
pub fn capture_opts() -> (MemoryObserver, RunOptions) {
    let observer = MemoryObserver::new();
    let opts = RunOptions::new().with_observer(Arc::new(observer.clone()));
    (observer, opts)
}
