//! File-backed checkpoint store.
//!
//! Layout: one directory per thread id under the store root, one file per
//! step named `<step>.<ext>`. Two textual encodings are supported: JSON and
//! YAML. `load` without a step selects the file with the numerically
//! maximal stem. Operations on the same thread are serialized by a
//! per-thread lock; distinct threads do not contend.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::checkpoint::{Checkpoint, Store, StoreError};
use super::persistence::PersistedCheckpoint;

/// Textual encoding of checkpoint files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointEncoding {
    Json,
    Yaml,
}

impl CheckpointEncoding {
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            CheckpointEncoding::Json => "json",
            CheckpointEncoding::Yaml => "yaml",
        }
    }

    fn encode(&self, persisted: &PersistedCheckpoint) -> Result<String, StoreError> {
        match self {
            CheckpointEncoding::Json => Ok(serde_json::to_string_pretty(persisted)?),
            CheckpointEncoding::Yaml => Ok(serde_yaml::to_string(persisted)?),
        }
    }

    fn decode(&self, raw: &str) -> Result<PersistedCheckpoint, StoreError> {
        match self {
            CheckpointEncoding::Json => Ok(serde_json::from_str(raw)?),
            CheckpointEncoding::Yaml => Ok(serde_yaml::from_str(raw)?),
        }
    }
}

/// Durable store writing one checkpoint file per `(thread, step)`.
pub struct FileStore {
    root: PathBuf,
    encoding: CheckpointEncoding,
    locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, encoding: CheckpointEncoding) -> Self {
        Self {
            root: root.into(),
            encoding,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn encoding(&self) -> CheckpointEncoding {
        self.encoding
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root.join(thread_id)
    }

    fn step_path(&self, thread_id: &str, step: u64) -> PathBuf {
        self.thread_dir(thread_id)
            .join(format!("{step}.{}", self.encoding.extension()))
    }

    /// Step numbers present in a thread directory, ascending. Files whose
    /// stem is not a number or whose extension does not match are ignored.
    fn steps_on_disk(&self, thread_id: &str) -> Result<Vec<u64>, StoreError> {
        let dir = self.thread_dir(thread_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut steps = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.encoding.extension()) {
                continue;
            }
            if let Some(step) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    fn read_step(&self, thread_id: &str, step: u64) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.step_path(thread_id, step);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let persisted = self.encoding.decode(&raw)?;
        Ok(Some(Checkpoint::from(persisted)))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let lock = self.thread_lock(&checkpoint.thread_id);
        let _guard = lock.lock().expect("thread lock poisoned");
        fs::create_dir_all(self.thread_dir(&checkpoint.thread_id))?;
        let encoded = self.encoding.encode(&PersistedCheckpoint::from(&checkpoint))?;
        fs::write(self.step_path(&checkpoint.thread_id, checkpoint.step), encoded)?;
        Ok(())
    }

    async fn load(
        &self,
        thread_id: &str,
        step: Option<u64>,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().expect("thread lock poisoned");
        let step = match step {
            Some(step) => step,
            None => match self.steps_on_disk(thread_id)?.last().copied() {
                Some(latest) => latest,
                None => return Ok(None),
            },
        };
        self.read_step(thread_id, step)
    }

    async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut threads = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    threads.push(name.to_string());
                }
            }
        }
        threads.sort();
        Ok(threads)
    }

    async fn list_steps(&self, thread_id: &str) -> Result<Vec<u64>, StoreError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().expect("thread lock poisoned");
        self.steps_on_disk(thread_id)
    }

    async fn delete(&self, thread_id: &str) -> Result<(), StoreError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().expect("thread lock poisoned");
        let dir = self.thread_dir(thread_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}
