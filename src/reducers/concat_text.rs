use serde_json::Value;

use super::Reducer;

/// Text concatenation reducer with nil treated as empty.
///
/// Non-string values contribute their compact JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConcatText;

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Reducer for ConcatText {
    fn apply(&self, old: Option<&Value>, new: Value) -> Value {
        let mut text = old.map(as_text).unwrap_or_default();
        text.push_str(&as_text(&new));
        Value::String(text)
    }
}
