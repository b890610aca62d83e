use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::Reducer;

/// Reducer table keyed by state key.
///
/// The registry is attached to every [`GraphState`](crate::state::GraphState)
/// derived from a graph and stays fixed for the lifetime of a run. Keys
/// without an entry merge with replacement semantics.
///
/// # Examples
///
/// ```rust
/// use stepgraph::reducers::{AppendValues, ReducerRegistry};
///
/// let registry = ReducerRegistry::new().with_reducer("messages", AppendValues);
/// assert!(registry.get("messages").is_some());
/// assert!(registry.get("other").is_none());
/// ```
#[derive(Clone, Default)]
pub struct ReducerRegistry {
    map: FxHashMap<String, Arc<dyn Reducer>>,
}

impl ReducerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    /// Register a reducer for a state key, replacing any previous entry.
    pub fn register(&mut self, key: impl Into<String>, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.map.insert(key.into(), reducer);
        self
    }

    /// Builder-style registration for fluent construction.
    #[must_use]
    pub fn with_reducer(mut self, key: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.register(key, Arc::new(reducer));
        self
    }

    /// Look up the reducer for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Reducer>> {
        self.map.get(key)
    }

    /// Keys that have a registered reducer.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    /// Number of registered reducers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when no reducers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerRegistry")
            .field("keys", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}
