use rustc_hash::FxHashMap;
use serde_json::json;
use std::sync::Arc;

use stepgraph::graphs::{route, Edge, RouteSelection, RouterFn};
use stepgraph::node::RunContext;
use stepgraph::reducers::ReducerRegistry;
use stepgraph::state::{delta, GraphState};
use stepgraph::types::NodeName;

fn ctx() -> RunContext {
    RunContext {
        step: 1,
        thread_id: "routing-test".into(),
        context: None,
    }
}

fn state_with_number(n: i64) -> GraphState {
    GraphState::new(Arc::new(ReducerRegistry::new())).merge(delta([("number", json!(n))]))
}

#[test]
fn static_edge_routes_to_its_target() {
    let edge = Edge::Static {
        from: NodeName::from("a"),
        to: NodeName::from("b"),
    };
    let destinations = route(&edge, &state_with_number(0), &ctx());
    assert_eq!(destinations, vec![NodeName::from("b")]);
}

#[test]
fn fan_out_edge_routes_to_all_targets() {
    let edge = Edge::FanOut {
        from: NodeName::from("a"),
        to: vec![NodeName::from("x"), NodeName::from("y"), NodeName::from("z")],
    };
    let destinations = route(&edge, &state_with_number(0), &ctx());
    assert_eq!(destinations.len(), 3);
    assert_eq!(destinations[0], NodeName::from("x"));
    assert_eq!(destinations[2], NodeName::from("z"));
}

#[test]
fn conditional_scalar_return_is_coerced_to_a_sequence() {
    let router: RouterFn = Arc::new(|state, _ctx| {
        if state.get("number").and_then(|v| v.as_i64()).unwrap_or(0) > 0 {
            "positive".into()
        } else {
            "other".into()
        }
    });
    let edge = Edge::Conditional {
        from: NodeName::from("check"),
        router,
        labels: None,
    };
    assert_eq!(
        route(&edge, &state_with_number(7), &ctx()),
        vec![NodeName::from("positive")]
    );
    assert_eq!(
        route(&edge, &state_with_number(-3), &ctx()),
        vec![NodeName::from("other")]
    );
}

#[test]
fn conditional_sequence_return_keeps_order() {
    let router: RouterFn = Arc::new(|_state, _ctx| vec!["first", "second"].into());
    let edge = Edge::Conditional {
        from: NodeName::from("splitter"),
        router,
        labels: None,
    };
    assert_eq!(
        route(&edge, &state_with_number(0), &ctx()),
        vec![NodeName::from("first"), NodeName::from("second")]
    );
}

#[test]
fn label_map_remaps_and_unmapped_tokens_pass_through() {
    let router: RouterFn = Arc::new(|_state, _ctx| vec!["continue", "audit"].into());
    let mut labels = FxHashMap::default();
    labels.insert("continue".to_string(), "next_stage".to_string());
    let edge = Edge::Conditional {
        from: NodeName::from("check"),
        router,
        labels: Some(labels),
    };
    assert_eq!(
        route(&edge, &state_with_number(0), &ctx()),
        vec![NodeName::from("next_stage"), NodeName::from("audit")]
    );
}

#[test]
fn label_map_can_target_the_finish_endpoint() {
    let router: RouterFn = Arc::new(|_state, _ctx| "done".into());
    let mut labels = FxHashMap::default();
    labels.insert("done".to_string(), "Finish".to_string());
    let edge = Edge::Conditional {
        from: NodeName::from("check"),
        router,
        labels: Some(labels),
    };
    assert_eq!(
        route(&edge, &state_with_number(0), &ctx()),
        vec![NodeName::Finish]
    );
}

#[test]
fn routing_is_pure_for_identical_state() {
    let router: RouterFn = Arc::new(|state, _ctx| {
        if state.get("number").and_then(|v| v.as_i64()).unwrap_or(0) % 2 == 0 {
            "even".into()
        } else {
            "odd".into()
        }
    });
    let edge = Edge::Conditional {
        from: NodeName::from("check"),
        router,
        labels: None,
    };
    let state = state_with_number(4);
    let first = route(&edge, &state, &ctx());
    let second = route(&edge, &state, &ctx());
    assert_eq!(first, second);
}

#[test]
fn route_selection_conversions() {
    assert_eq!(
        RouteSelection::from("a").into_tokens(),
        vec!["a".to_string()]
    );
    assert_eq!(
        RouteSelection::from(NodeName::Finish).into_tokens(),
        vec!["Finish".to_string()]
    );
    assert_eq!(
        RouteSelection::from(vec!["a", "b"]).into_tokens(),
        vec!["a".to_string(), "b".to_string()]
    );
}
