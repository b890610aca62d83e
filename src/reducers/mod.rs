//! Per-key merge functions for workflow state.
//!
//! A [`Reducer`] combines the previous value of a state key with an incoming
//! delta value. Reducers must be pure: the merged result may depend only on
//! the two inputs. Keys without a registered reducer use replacement
//! semantics.
//!
//! Built-ins:
//! - [`AppendValues`]: sequence append, scalars coerced to one-item sequences
//! - [`ConcatText`]: string concatenation with nil treated as empty
//! - [`MapMerge`]: shallow object merge, right-biased on key conflict
//!
//! Custom reducers are arbitrary binary functions, wrapped via [`FnReducer`]
//! or by implementing [`Reducer`] directly.

mod append_values;
mod concat_text;
mod map_merge;
mod reducer_registry;

pub use append_values::AppendValues;
pub use concat_text::ConcatText;
pub use map_merge::MapMerge;
pub use reducer_registry::ReducerRegistry;

use serde_json::Value;

/// Pure binary merge function `(old, new) -> merged` for one state key.
pub trait Reducer: Send + Sync {
    /// Combine the previous value (absent on first write) with the incoming
    /// delta value.
    fn apply(&self, old: Option<&Value>, new: Value) -> Value;
}

/// Adapter turning a closure into a [`Reducer`].
///
/// ```rust
/// use serde_json::json;
/// use stepgraph::reducers::{FnReducer, Reducer};
///
/// let sum = FnReducer::new(|old, new| {
///     json!(old.and_then(|v| v.as_i64()).unwrap_or(0) + new.as_i64().unwrap_or(0))
/// });
/// assert_eq!(sum.apply(Some(&json!(1)), json!(4)), json!(5));
/// ```
pub struct FnReducer<F> {
    func: F,
}

impl<F> FnReducer<F>
where
    F: Fn(Option<&Value>, Value) -> Value + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(Option<&Value>, Value) -> Value + Send + Sync,
{
    fn apply(&self, old: Option<&Value>, new: Value) -> Value {
        (self.func)(old, new)
    }
}
