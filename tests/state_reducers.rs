mod common;

use common::sum_reducer;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stepgraph::reducers::{AppendValues, ConcatText, FnReducer, MapMerge, ReducerRegistry};
use stepgraph::state::{delta, GraphState, StateDelta};

fn plain_state() -> GraphState {
    GraphState::new(Arc::new(ReducerRegistry::new()))
}

#[test]
fn merge_with_empty_delta_is_identity() {
    let state = plain_state().merge(delta([("a", json!(1)), ("b", json!("x"))]));
    let merged = state.merge(StateDelta::default());
    assert_eq!(merged, state);
}

#[test]
fn merge_is_deterministic() {
    let registry = Arc::new(
        ReducerRegistry::new()
            .with_reducer("counter", sum_reducer())
            .with_reducer("messages", AppendValues),
    );
    let base = GraphState::new(registry).merge(delta([
        ("counter", json!(1)),
        ("messages", json!(["a"])),
    ]));
    let update = delta([("counter", json!(2)), ("messages", json!(["b"]))]);
    let first = base.merge(update.clone());
    let second = base.merge(update);
    assert_eq!(first, second);
}

#[test]
fn reducer_invoked_exactly_once_per_key_per_merge() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counting = {
        let calls = Arc::clone(&calls);
        FnReducer::new(move |_old, new| {
            calls.fetch_add(1, Ordering::SeqCst);
            new
        })
    };
    let registry = Arc::new(ReducerRegistry::new().with_reducer("k", counting));
    let state = GraphState::new(registry);

    let state = state.merge(delta([("k", json!(1))]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let _ = state.merge(delta([("k", json!(2)), ("unrelated", json!(0))]));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_reducer_replaces() {
    let state = plain_state()
        .merge(delta([("k", json!("old"))]))
        .merge(delta([("k", json!("new"))]));
    assert_eq!(state.get("k"), Some(&json!("new")));
}

#[test]
fn absent_keys_stay_absent() {
    let state = plain_state().merge(delta([("present", json!(1))]));
    assert!(state.get("absent").is_none());
    assert_eq!(state.len(), 1);
}

#[test]
fn receiver_is_unaffected_by_merge() {
    let base = plain_state().merge(delta([("k", json!(1))]));
    let snapshot_before = base.snapshot();
    let _derived = base.merge(delta([("k", json!(2)), ("extra", json!(3))]));
    assert_eq!(base.snapshot(), snapshot_before);
}

#[test]
fn append_values_preserves_order_across_merges() {
    let registry = Arc::new(ReducerRegistry::new().with_reducer("log", AppendValues));
    let state = GraphState::new(registry)
        .merge(delta([("log", json!(["first"]))]))
        .merge(delta([("log", json!("second"))]))
        .merge(delta([("log", json!(["third", "fourth"]))]));
    assert_eq!(
        state.get("log"),
        Some(&json!(["first", "second", "third", "fourth"]))
    );
}

#[test]
fn concat_text_treats_nil_as_empty() {
    let registry = Arc::new(ReducerRegistry::new().with_reducer("text", ConcatText));
    let state = GraphState::new(registry)
        .merge(delta([("text", json!("abc"))]))
        .merge(delta([("text", json!(null))]))
        .merge(delta([("text", json!("def"))]));
    assert_eq!(state.get("text"), Some(&json!("abcdef")));
}

#[test]
fn map_merge_is_shallow_and_right_biased() {
    let registry = Arc::new(ReducerRegistry::new().with_reducer("config", MapMerge));
    let state = GraphState::new(registry)
        .merge(delta([("config", json!({"a": 1, "nested": {"x": 1}}))]))
        .merge(delta([("config", json!({"b": 2, "nested": {"y": 2}}))]));
    // shallow: the nested object is replaced wholesale, not merged
    assert_eq!(
        state.get("config"),
        Some(&json!({"a": 1, "b": 2, "nested": {"y": 2}}))
    );
}

#[test]
fn accumulating_reducers_scenario() {
    let registry = Arc::new(
        ReducerRegistry::new()
            .with_reducer("counter", sum_reducer())
            .with_reducer("messages", AppendValues),
    );
    let state = GraphState::new(registry)
        .merge(delta([
            ("counter", json!(5)),
            ("messages", json!([{"role": "user", "content": "Hello"}])),
        ]))
        .merge(delta([
            ("counter", json!(3)),
            ("messages", json!([{"role": "assistant", "content": "Hi"}])),
        ]));

    assert_eq!(state.get("counter"), Some(&json!(8)));
    let messages = state.get("messages").and_then(|v| v.as_array()).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], json!("user"));
    assert_eq!(messages[1]["role"], json!("assistant"));
}
