use serde_json::Value;

use super::Reducer;

/// Shallow object merge, right-biased on key conflict.
///
/// When either side is not an object, the incoming value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MapMerge;

impl Reducer for MapMerge {
    fn apply(&self, old: Option<&Value>, new: Value) -> Value {
        if let Some(Value::Object(existing)) = old {
            if let Value::Object(incoming) = new {
                let mut merged = existing.clone();
                merged.extend(incoming);
                return Value::Object(merged);
            }
        }
        new
    }
}
