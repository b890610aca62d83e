//! Lifecycle observability for workflow runs.
//!
//! Observers are passive sinks notified of every [`RunEvent`]: run start and
//! end, node execution with timing, superstep completion, commands,
//! interrupts, checkpoints, and collaborator request/response traffic.
//! Sinks may be invoked concurrently from multiple worker tasks and must
//! never throw into the scheduler: [`ObserverSet::emit`] catches both errors
//! and panics, logs them, and moves on.

mod event;

pub use event::RunEvent;

use miette::Diagnostic;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors a sink may report. Dispatch suppresses them; they only surface to
/// code that drives a sink directly.
#[derive(Debug, Error, Diagnostic)]
pub enum ObserverError {
    #[error(transparent)]
    #[diagnostic(code(stepgraph::observers::io))]
    Io(#[from] std::io::Error),

    #[error("event channel receiver dropped")]
    #[diagnostic(
        code(stepgraph::observers::channel_closed),
        help("Keep the receiving end alive for the duration of the run.")
    )]
    ChannelClosed,

    #[error("observer sink failed: {0}")]
    #[diagnostic(code(stepgraph::observers::sink))]
    Sink(String),
}

/// A passive event sink.
///
/// Implementations decide how to record or forward each event. They must be
/// safe to call from multiple worker threads at once.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &RunEvent) -> Result<(), ObserverError>;
}

/// Cheap-to-clone fan-out handle over a fixed set of observers.
///
/// Emission is synchronous: by the time `emit` returns, every sink has seen
/// the event. Sink faults and panics are logged through `tracing` and
/// suppressed.
#[derive(Clone, Default)]
pub struct ObserverSet {
    sinks: Arc<Vec<Arc<dyn Observer>>>,
}

impl ObserverSet {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Observer>>) -> Self {
        Self {
            sinks: Arc::new(sinks),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Broadcast one event to every sink.
    pub fn emit(&self, event: RunEvent) {
        for sink in self.sinks.iter() {
            match catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(event = event.label(), error = %err, "observer sink failed; suppressed");
                }
                Err(_) => {
                    tracing::warn!(event = event.label(), "observer sink panicked; suppressed");
                }
            }
        }
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &RunEvent) -> Result<(), ObserverError> {
        match event {
            RunEvent::GraphStart { graph, thread_id, .. } => {
                tracing::info!(target: "stepgraph::events", graph = %graph, thread_id = %thread_id, "graph_start");
            }
            RunEvent::GraphEnd { thread_id, .. } => {
                tracing::info!(target: "stepgraph::events", thread_id = %thread_id, "graph_end");
            }
            RunEvent::NodeStart { node, step, .. } => {
                tracing::debug!(target: "stepgraph::events", node = %node, step, "node_start");
            }
            RunEvent::NodeEnd { node, step, duration, .. } => {
                tracing::debug!(target: "stepgraph::events", node = %node, step, ?duration, "node_end");
            }
            RunEvent::NodeError { node, step, error, .. } => {
                tracing::error!(target: "stepgraph::events", node = %node, step, error = %error, "node_error");
            }
            RunEvent::StepComplete { step, active_nodes, duration, .. } => {
                tracing::info!(
                    target: "stepgraph::events",
                    step,
                    active = active_nodes.len(),
                    ?duration,
                    "step_complete"
                );
            }
            RunEvent::CommandProcessed { node, step, goto } => {
                tracing::debug!(target: "stepgraph::events", node = %node, step, goto = ?goto, "command_processed");
            }
            RunEvent::Interrupted { node, step, message, resumed, .. } => {
                tracing::info!(target: "stepgraph::events", node = %node, step, message = %message, resumed, "interrupt");
            }
            RunEvent::CheckpointSaved { thread_id, step } => {
                tracing::debug!(target: "stepgraph::events", thread_id = %thread_id, step, "checkpoint_saved");
            }
            RunEvent::LlmRequest { node, .. } => {
                tracing::debug!(target: "stepgraph::events", node = %node, "llm_request");
            }
            RunEvent::LlmResponse { node, .. } => {
                tracing::debug!(target: "stepgraph::events", node = %node, "llm_response");
            }
            RunEvent::LlmError { node, error } => {
                tracing::warn!(target: "stepgraph::events", node = %node, error = %error, "llm_error");
            }
            RunEvent::Shutdown => {
                tracing::debug!(target: "stepgraph::events", "shutdown");
            }
        }
        Ok(())
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemoryObserver {
    entries: Arc<Mutex<Vec<RunEvent>>>,
}

impl MemoryObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events, in emission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.entries.lock().expect("observer entries poisoned").clone()
    }

    /// Labels of all captured events, in emission order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(RunEvent::label).collect()
    }

    /// Drop all captured events.
    pub fn clear(&self) {
        self.entries.lock().expect("observer entries poisoned").clear();
    }
}

impl Observer for MemoryObserver {
    fn on_event(&self, event: &RunEvent) -> Result<(), ObserverError> {
        self.entries
            .lock()
            .expect("observer entries poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming events to async consumers.
pub struct ChannelObserver {
    tx: flume::Sender<RunEvent>,
}

impl ChannelObserver {
    /// Create a sink that forwards every event to `tx`.
    ///
    /// ```no_run
    /// use stepgraph::observers::ChannelObserver;
    ///
    /// let (tx, rx) = flume::unbounded();
    /// let sink = ChannelObserver::new(tx);
    /// tokio::spawn(async move {
    ///     while let Ok(event) = rx.recv_async().await {
    ///         println!("event: {}", event.label());
    ///     }
    /// });
    /// # drop(sink);
    /// ```
    #[must_use]
    pub fn new(tx: flume::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn on_event(&self, event: &RunEvent) -> Result<(), ObserverError> {
        self.tx
            .send(event.clone())
            .map_err(|_| ObserverError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingObserver;

    impl Observer for PanickingObserver {
        fn on_event(&self, _event: &RunEvent) -> Result<(), ObserverError> {
            panic!("sink blew up");
        }
    }

    #[test]
    fn emit_suppresses_panics_and_errors() {
        let memory = MemoryObserver::new();
        let set = ObserverSet::new(vec![
            Arc::new(PanickingObserver),
            Arc::new(memory.clone()),
        ]);
        set.emit(RunEvent::Shutdown);
        // the panicking sink did not prevent delivery to the next one
        assert_eq!(memory.labels(), vec!["shutdown"]);
    }

    #[test]
    fn channel_observer_reports_closed_receiver() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let sink = ChannelObserver::new(tx);
        assert!(matches!(
            sink.on_event(&RunEvent::Shutdown),
            Err(ObserverError::ChannelClosed)
        ));
    }
}
