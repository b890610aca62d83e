//! Keyed workflow state and the reducer merge algebra.
//!
//! [`GraphState`] maps symbolic keys to arbitrary JSON values and carries a
//! shared, immutable reducer table. State is logically immutable: every
//! [`merge`](GraphState::merge) produces a new state and leaves the receiver
//! untouched, which is what makes observer snapshots and checkpoints safe to
//! hand out while a run advances.
//!
//! # Merge semantics
//!
//! For each `(key, value)` in a delta: if the reducer table has an entry for
//! `key`, the merged value is `reducer(old, value)`; otherwise the value
//! replaces the old one. Merging an empty delta yields a state equal to the
//! receiver, merges are deterministic given identical inputs, and each
//! reducer is invoked exactly once per key per merge.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stepgraph::reducers::{FnReducer, ReducerRegistry};
//! use stepgraph::state::{delta, GraphState};
//!
//! let reducers = Arc::new(ReducerRegistry::new().with_reducer(
//!     "counter",
//!     FnReducer::new(|old, new| {
//!         json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + new.as_i64().unwrap_or(0))
//!     }),
//! ));
//!
//! let state = GraphState::new(reducers);
//! let state = state.merge(delta([("counter", json!(5))]));
//! let state = state.merge(delta([("counter", json!(3))]));
//! assert_eq!(state.get("counter"), Some(&json!(8)));
//! ```

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::reducers::ReducerRegistry;

/// A partial state update: plain key→value pairs merged via reducers.
pub type StateDelta = FxHashMap<String, Value>;

/// Build a [`StateDelta`] from key/value pairs.
///
/// ```rust
/// use serde_json::json;
/// use stepgraph::state::delta;
///
/// let d = delta([("number", json!(5)), ("label", json!("ready"))]);
/// assert_eq!(d.len(), 2);
/// ```
pub fn delta<K, I>(pairs: I) -> StateDelta
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect()
}

/// Errors raised by the state layer.
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    /// A key holds a value that does not decode to the requested type.
    #[error("state key '{key}' does not hold the requested type: {source}")]
    #[diagnostic(
        code(stepgraph::state::decode),
        help("Check which node last wrote this key and what shape it produced.")
    )]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable-by-merge keyed state for one execution.
///
/// Cloning is shallow for the reducer table (shared `Arc`) and deep for the
/// entries. Equality compares entries only; reducer tables are attached at
/// construction and fixed for the lifetime of a run.
#[derive(Clone)]
pub struct GraphState {
    entries: FxHashMap<String, Value>,
    reducers: Arc<ReducerRegistry>,
}

impl GraphState {
    /// Create an empty state bound to a reducer table.
    #[must_use]
    pub fn new(reducers: Arc<ReducerRegistry>) -> Self {
        Self {
            entries: FxHashMap::default(),
            reducers,
        }
    }

    /// Reattach a reducer table to raw entries, e.g. after loading a
    /// checkpoint (reducers are never persisted).
    #[must_use]
    pub fn from_entries(reducers: Arc<ReducerRegistry>, entries: FxHashMap<String, Value>) -> Self {
        Self { entries, reducers }
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Decode a value into a concrete type.
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the value
    /// exists but does not decode.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StateError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no keys are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the underlying entries.
    #[must_use]
    pub fn entries(&self) -> &FxHashMap<String, Value> {
        &self.entries
    }

    /// The reducer table this state merges through.
    #[must_use]
    pub fn reducers(&self) -> &Arc<ReducerRegistry> {
        &self.reducers
    }

    /// A detached copy of the entries, safe to hand to observers and stores
    /// while the run keeps merging.
    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, Value> {
        self.entries.clone()
    }

    /// Merge a delta into this state, producing a new state.
    ///
    /// The receiver is unaffected. Keys absent from both sides stay absent,
    /// and key ordering within the delta is irrelevant to the result.
    #[must_use]
    pub fn merge(&self, delta: StateDelta) -> GraphState {
        if delta.is_empty() {
            return self.clone();
        }
        let mut entries = self.entries.clone();
        for (key, value) in delta {
            let merged = match self.reducers.get(&key) {
                Some(reducer) => reducer.apply(self.entries.get(&key), value),
                None => value,
            };
            entries.insert(key, merged);
        }
        GraphState {
            entries,
            reducers: Arc::clone(&self.reducers),
        }
    }
}

impl PartialEq for GraphState {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphState")
            .field("entries", &self.entries)
            .field("reduced_keys", &self.reducers.keys().collect::<Vec<_>>())
            .finish()
    }
}
