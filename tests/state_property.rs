use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

use stepgraph::reducers::ReducerRegistry;
use stepgraph::state::{GraphState, StateDelta};

fn key_strategy() -> impl Strategy<Value = String> {
    // Letters first so keys look like the symbols they model.
    prop::string::string_regex("[a-z][a-z0-9_]{0,8}").expect("valid regex")
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        any::<bool>().prop_map(|b| json!(b)),
        "[a-z]{0,6}".prop_map(|s| json!(s)),
    ]
}

fn delta_strategy() -> impl Strategy<Value = StateDelta> {
    prop::collection::hash_map(key_strategy(), value_strategy(), 0..6)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn empty_delta_is_right_identity(base in delta_strategy()) {
        let state = GraphState::new(Arc::new(ReducerRegistry::new())).merge(base);
        prop_assert_eq!(state.merge(StateDelta::default()), state);
    }

    #[test]
    fn merge_is_deterministic(base in delta_strategy(), update in delta_strategy()) {
        let state = GraphState::new(Arc::new(ReducerRegistry::new())).merge(base);
        prop_assert_eq!(state.merge(update.clone()), state.merge(update));
    }

    #[test]
    fn replacement_semantics_without_reducers(base in delta_strategy(), update in delta_strategy()) {
        let state = GraphState::new(Arc::new(ReducerRegistry::new())).merge(base.clone());
        let merged = state.merge(update.clone());
        for (key, value) in &update {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        for (key, value) in &base {
            if !update.contains_key(key) {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
        prop_assert!(merged.len() <= base.len() + update.len());
    }
}
