mod common;

use common::capture_opts;
use common::nodes::{CountingNode, FailingNode, SlowDeltaNode};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stepgraph::control::{Command, Dispatch, Interrupt, NodeOutput};
use stepgraph::graph::RunOptions;
use stepgraph::graphs::GraphBuilder;
use stepgraph::observers::RunEvent;
use stepgraph::runtimes::{RunnerError, SchedulerError};
use stepgraph::state::{delta, StateDelta};
use stepgraph::types::NodeName;

#[tokio::test]
async fn barrier_orders_node_events_across_supersteps() {
    let graph = GraphBuilder::new()
        .add_node("slow", SlowDeltaNode::new(60, delta([("slow", json!(true))])))
        .add_node("fast", SlowDeltaNode::new(1, delta([("fast", json!(true))])))
        .add_node("after", SlowDeltaNode::new(1, delta([("after", json!(true))])))
        .add_fan_out_edge(
            NodeName::Start,
            vec![NodeName::from("slow"), NodeName::from("fast")],
        )
        .add_edge("slow", "after")
        .add_edge("fast", "after")
        .set_finish_point("after")
        .compile()
        .expect("valid graph");

    let (observer, opts) = capture_opts();
    graph
        .invoke(StateDelta::default(), opts)
        .await
        .expect("run succeeds");

    let events = observer.snapshot();
    let mut last_end_per_step: std::collections::BTreeMap<u64, usize> = Default::default();
    let mut first_start_per_step: std::collections::BTreeMap<u64, usize> = Default::default();
    for (idx, event) in events.iter().enumerate() {
        match event {
            RunEvent::NodeStart { step, .. } => {
                first_start_per_step.entry(*step).or_insert(idx);
            }
            RunEvent::NodeEnd { step, .. } => {
                last_end_per_step.insert(*step, idx);
            }
            _ => {}
        }
    }
    // no node_start at step N+1 before every node_end at step N
    for (step, first_start) in &first_start_per_step {
        if let Some(last_end) = last_end_per_step.get(&(step - 1)) {
            assert!(
                last_end < first_start,
                "step {step} started before step {} finished",
                step - 1
            );
        }
    }
}

#[tokio::test]
async fn duplicate_frames_execute_twice() {
    let hits = Arc::new(AtomicUsize::new(0));
    let graph = GraphBuilder::new()
        .add_node_fn("fan_out", |_state, _ctx| {
            // two sends with identical target and payload; not deduplicated
            Ok(NodeOutput::MultiSend(vec![
                Dispatch::new("dup", delta([("payload", json!(1))])),
                Dispatch::new("dup", delta([("payload", json!(1))])),
            ]))
        })
        .add_node(
            "dup",
            CountingNode::new(Arc::clone(&hits), delta([("seen", json!(true))])),
        )
        .set_entry_point("fan_out")
        .compile()
        .expect("valid graph");

    graph
        .invoke(StateDelta::default(), RunOptions::new())
        .await
        .expect("run succeeds");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn node_without_outgoing_edges_defaults_to_finish() {
    let graph = GraphBuilder::new()
        .add_node_fn("dead_end", |_state, _ctx| {
            Ok(delta([("done", json!(true))]).into())
        })
        .set_entry_point("dead_end")
        .compile()
        .expect("valid graph");

    let outcome = graph
        .invoke(StateDelta::default(), RunOptions::new())
        .await
        .expect("run succeeds");
    assert_eq!(outcome.state.get("done"), Some(&json!(true)));
    // Start, dead_end
    assert_eq!(outcome.step, 2);
}

#[tokio::test]
async fn node_fault_terminates_the_run_and_is_reraised() {
    let graph = GraphBuilder::new()
        .add_node("boom", FailingNode::default())
        .set_entry_point("boom")
        .set_finish_point("boom")
        .compile()
        .expect("valid graph");

    let (observer, opts) = capture_opts();
    let result = graph.invoke(delta([("input", json!(1))]), opts).await;

    match result {
        Err(RunnerError::Scheduler(SchedulerError::NodeRun { node, step, .. })) => {
            assert_eq!(node, NodeName::from("boom"));
            assert_eq!(step, 2);
        }
        other => panic!("expected NodeRun error, got {:?}", other.map(|o| o.step)),
    }

    let labels = observer.labels();
    let error_idx = labels
        .iter()
        .position(|l| *l == "node_error")
        .expect("node_error emitted");
    let end_idx = labels
        .iter()
        .position(|l| *l == "graph_end")
        .expect("graph_end emitted");
    assert!(error_idx < end_idx);
    assert_eq!(labels.last(), Some(&"shutdown"));
}

#[tokio::test]
async fn goto_overrides_declared_edges() {
    let skipped_runs = Arc::new(AtomicUsize::new(0));
    let target_runs = Arc::new(AtomicUsize::new(0));
    let graph = GraphBuilder::new()
        .add_node_fn("decide", |_state, _ctx| {
            Ok(Command::new().with_goto("target").into())
        })
        .add_node(
            "declared",
            CountingNode::new(Arc::clone(&skipped_runs), StateDelta::default()),
        )
        .add_node(
            "target",
            CountingNode::new(Arc::clone(&target_runs), delta([("hit", json!(true))])),
        )
        .set_entry_point("decide")
        .add_edge("decide", "declared")
        .set_finish_point("declared")
        .set_finish_point("target")
        .compile()
        .expect("valid graph");

    let outcome = graph
        .invoke(StateDelta::default(), RunOptions::new())
        .await
        .expect("run succeeds");

    assert_eq!(outcome.state.get("hit"), Some(&json!(true)));
    assert_eq!(target_runs.load(Ordering::SeqCst), 1);
    assert_eq!(skipped_runs.load(Ordering::SeqCst), 0);
}

fn approval_graph() -> stepgraph::graph::Graph {
    GraphBuilder::new()
        .add_node_fn("approval", |state, _ctx| {
            if state.contains_key("approval") {
                Ok(delta([("message", json!("approved"))]).into())
            } else {
                Ok(Interrupt::new("awaiting approval", json!({"field": "approval"})).into())
            }
        })
        .set_entry_point("approval")
        .set_finish_point("approval")
        .compile()
        .expect("valid graph")
}

#[tokio::test]
async fn interrupt_with_handler_reruns_the_node_with_injected_delta() {
    let (observer, opts) = capture_opts();
    let opts = opts.on_interrupt(|interrupt| {
        assert_eq!(interrupt.message, "awaiting approval");
        Some(delta([("approval", json!("granted"))]))
    });
    let outcome = approval_graph()
        .invoke(StateDelta::default(), opts)
        .await
        .expect("run succeeds");

    assert_eq!(outcome.state.get("message"), Some(&json!("approved")));
    assert_eq!(outcome.state.get("approval"), Some(&json!("granted")));

    let resumed = observer.snapshot().into_iter().any(
        |event| matches!(event, RunEvent::Interrupted { resumed: true, .. }),
    );
    assert!(resumed);
}

#[tokio::test]
async fn interrupt_without_handler_terminates_cleanly() {
    let (observer, opts) = capture_opts();
    let outcome = approval_graph()
        .invoke(delta([("input", json!("data"))]), opts)
        .await
        .expect("clean termination, not an error");

    // pre-interrupt state: the node's message was never written
    assert!(outcome.state.get("message").is_none());
    assert_eq!(outcome.state.get("input"), Some(&json!("data")));

    let interrupted = observer.snapshot().into_iter().any(
        |event| matches!(event, RunEvent::Interrupted { resumed: false, .. }),
    );
    assert!(interrupted);
}

#[tokio::test]
async fn max_steps_guards_cyclic_graphs() {
    let graph = GraphBuilder::new()
        .add_node_fn("spin", |_state, _ctx| Ok(NodeOutput::empty()))
        .set_entry_point("spin")
        .add_edge("spin", "spin")
        .compile()
        .expect("valid graph");

    let result = graph
        .invoke(StateDelta::default(), RunOptions::new().with_max_steps(5))
        .await;
    assert!(matches!(
        result,
        Err(RunnerError::StepLimitExceeded { limit: 5 })
    ));
}

#[tokio::test]
async fn stream_yields_one_summary_per_superstep() {
    let graph = GraphBuilder::new()
        .add_node_fn("first", |_state, _ctx| {
            Ok(delta([("a", json!(1))]).into())
        })
        .add_node_fn("second", |_state, _ctx| {
            Ok(delta([("b", json!(2))]).into())
        })
        .set_entry_point("first")
        .add_edge("first", "second")
        .set_finish_point("second")
        .compile()
        .expect("valid graph");

    let mut summaries = Vec::new();
    let outcome = graph
        .stream(StateDelta::default(), RunOptions::new(), |summary| {
            summaries.push(summary);
        })
        .await
        .expect("run succeeds");

    // Start, first, second
    assert_eq!(summaries.len(), 3);
    assert_eq!(
        summaries.iter().map(|s| s.step).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(summaries[..2].iter().all(|s| !s.completed));
    assert!(summaries[2].completed);
    assert_eq!(summaries[2].state.get("b"), Some(&json!(2)));
    assert_eq!(outcome.step, 3);
}

#[tokio::test]
async fn empty_delta_leaves_state_unchanged() {
    let graph = GraphBuilder::new()
        .add_node_fn("noop", |_state, _ctx| Ok(NodeOutput::empty()))
        .set_entry_point("noop")
        .set_finish_point("noop")
        .compile()
        .expect("valid graph");

    let outcome = graph
        .invoke(delta([("k", json!("v"))]), RunOptions::new())
        .await
        .expect("run succeeds");
    assert_eq!(outcome.state.get("k"), Some(&json!("v")));
    assert_eq!(outcome.state.len(), 1);
}

#[tokio::test]
async fn send_to_finish_terminates_on_the_following_step() {
    let graph = GraphBuilder::new()
        .add_node_fn("sender", |_state, _ctx| {
            Ok(Dispatch::new(NodeName::Finish, delta([("sent", json!(true))])).into())
        })
        .set_entry_point("sender")
        .compile()
        .expect("valid graph");

    let outcome = graph
        .invoke(StateDelta::default(), RunOptions::new())
        .await
        .expect("run succeeds");
    assert_eq!(outcome.state.get("sent"), Some(&json!(true)));
    // Start, sender, then the Finish frame itself: one extra observed step
    assert_eq!(outcome.step, 3);
}

#[tokio::test]
async fn conditional_route_to_unknown_node_faults_at_route_time() {
    let router: stepgraph::graphs::RouterFn = Arc::new(|_state, _ctx| "ghost".into());
    let graph = GraphBuilder::new()
        .add_node_fn("worker", |_state, _ctx| Ok(NodeOutput::empty()))
        .set_entry_point("worker")
        .add_conditional_edge("worker", router)
        .compile()
        .expect("valid graph");

    let result = graph.invoke(StateDelta::default(), RunOptions::new()).await;
    match result {
        Err(RunnerError::UnknownRouteTarget { from, to }) => {
            assert_eq!(from, NodeName::from("worker"));
            assert_eq!(to, "ghost");
        }
        other => panic!("expected UnknownRouteTarget, got {:?}", other.map(|o| o.step)),
    }
}
