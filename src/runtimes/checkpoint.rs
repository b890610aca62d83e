//! Checkpoint persistence contract and the in-memory store.
//!
//! A [`Checkpoint`] is the authoritative record of a thread's progress
//! between supersteps: a detached state snapshot plus step number and
//! metadata. Reducers are not serializable, so checkpoints carry only
//! key→value entries; the runtime reattaches the reducer table from the
//! currently loaded graph at load time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::NodeName;

/// Metadata key holding the encoded next-step node names.
pub const ACTIVE_NODES_KEY: &str = "active_nodes";
/// Metadata key set when an unhandled interrupt terminated the run.
pub const INTERRUPTED_KEY: &str = "interrupted";

/// Persisted record of a thread's progress at one superstep boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step: u64,
    /// Detached state entries; reducers are reattached at load.
    pub state: FxHashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub metadata: FxHashMap<String, Value>,
}

impl Checkpoint {
    /// Node names recorded as active for the next superstep, decoded from
    /// metadata. Empty when the run had terminated (or for legacy entries).
    #[must_use]
    pub fn active_nodes(&self) -> Vec<NodeName> {
        self.metadata
            .get(ACTIVE_NODES_KEY)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(NodeName::decode)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `true` when this checkpoint was written by an unhandled interrupt.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.metadata
            .get(INTERRUPTED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Faults raised by checkpoint stores.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("checkpoint I/O failed: {source}")]
    #[diagnostic(code(stepgraph::store::io))]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("checkpoint JSON encoding failed: {source}")]
    #[diagnostic(code(stepgraph::store::serde_json))]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("checkpoint YAML encoding failed: {source}")]
    #[diagnostic(code(stepgraph::store::serde_yaml))]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },
}

/// Thread×step checkpoint persistence.
///
/// `save` must persist a copy uncoupled from the caller's in-memory state so
/// later merges cannot mutate persisted data; a second save for the same
/// `(thread, step)` replaces the first (idempotent retry). Operations on
/// different threads are independent; operations on the same thread are
/// serialized by the implementation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Durably persist `checkpoint`, overwriting any prior entry for its
    /// `(thread, step)`.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;

    /// Load the checkpoint at `step`, or the latest when `step` is `None`.
    /// `Ok(None)` when no matching entry exists.
    async fn load(&self, thread_id: &str, step: Option<u64>)
        -> Result<Option<Checkpoint>, StoreError>;

    /// All known thread ids.
    async fn list_threads(&self) -> Result<Vec<String>, StoreError>;

    /// Ascending step numbers checkpointed for `thread_id`.
    async fn list_steps(&self, thread_id: &str) -> Result<Vec<u64>, StoreError>;

    /// Remove all checkpoints for `thread_id`.
    async fn delete(&self, thread_id: &str) -> Result<(), StoreError>;
}

/// Volatile store for tests and development. Cannot fail.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<FxHashMap<String, BTreeMap<u64, Checkpoint>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .insert(checkpoint.step, checkpoint);
        Ok(())
    }

    async fn load(
        &self,
        thread_id: &str,
        step: Option<u64>,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let steps = match inner.get(thread_id) {
            Some(steps) => steps,
            None => return Ok(None),
        };
        let entry = match step {
            Some(step) => steps.get(&step),
            None => steps.last_key_value().map(|(_, cp)| cp),
        };
        Ok(entry.cloned())
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut threads: Vec<String> = inner.keys().cloned().collect();
        threads.sort();
        Ok(threads)
    }

    async fn list_steps(&self, thread_id: &str) -> Result<Vec<u64>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .get(thread_id)
            .map(|steps| steps.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.remove(thread_id);
        Ok(())
    }
}
