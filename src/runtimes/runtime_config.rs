//! Runtime defaults configured on the graph at build time.

use std::path::PathBuf;
use std::sync::Arc;

use super::checkpoint::{InMemoryStore, Store};
use super::store_file::{CheckpointEncoding, FileStore};

/// Which store kind `invoke`/`stream` build when the caller supplies none.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StoreConfig {
    /// Volatile per-run store.
    #[default]
    InMemory,
    /// File-backed store with JSON-encoded checkpoint files.
    JsonFile { root: Option<PathBuf> },
    /// File-backed store with YAML-encoded checkpoint files.
    YamlFile { root: Option<PathBuf> },
}

/// Defaults a graph hands to every run that does not override them.
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Fixed thread id; generated per run when unset.
    pub thread_id: Option<String>,
    /// Store built for runs that do not pass one.
    pub store: StoreConfig,
    /// Superstep guard for cyclic graphs.
    pub max_steps: Option<u64>,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub(crate) fn build_store(&self) -> Arc<dyn Store> {
        match &self.store {
            StoreConfig::InMemory => Arc::new(InMemoryStore::new()),
            StoreConfig::JsonFile { root } => Arc::new(FileStore::new(
                resolve_store_root(root.clone()),
                CheckpointEncoding::Json,
            )),
            StoreConfig::YamlFile { root } => Arc::new(FileStore::new(
                resolve_store_root(root.clone()),
                CheckpointEncoding::Yaml,
            )),
        }
    }
}

/// Explicit root, else `STEPGRAPH_STORE_DIR` (a `.env` file is honored),
/// else a directory under the working tree.
fn resolve_store_root(provided: Option<PathBuf>) -> PathBuf {
    if let Some(root) = provided {
        return root;
    }
    dotenvy::dotenv().ok();
    std::env::var("STEPGRAPH_STORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("stepgraph_checkpoints"))
}
