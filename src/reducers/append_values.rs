use serde_json::Value;

use super::Reducer;

/// Append-sequence reducer: `old ⊕ new`, preserving order.
///
/// A non-sequence incoming value is coerced to a one-item sequence; an
/// absent or non-sequence previous value contributes its scalar form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AppendValues;

impl Reducer for AppendValues {
    fn apply(&self, old: Option<&Value>, new: Value) -> Value {
        let mut items = match old {
            Some(Value::Array(existing)) => existing.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        };
        match new {
            Value::Array(incoming) => items.extend(incoming),
            Value::Null => {}
            scalar => items.push(scalar),
        }
        Value::Array(items)
    }
}
