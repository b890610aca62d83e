/*!
Serde models for checkpoint files.

Explicit persisted shapes are kept decoupled from the in-memory
[`Checkpoint`](crate::runtimes::Checkpoint) so the file store stays lean and
the on-disk layout is stable: timestamps are RFC3339 strings, state is a
plain key→value object, and unknown metadata keys round-trip untouched.
This module performs no I/O.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtimes::checkpoint::Checkpoint;

/// On-disk shape of one checkpoint file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub step: u64,
    #[serde(default)]
    pub state: FxHashMap<String, Value>,
    /// RFC3339 creation time (keeps `chrono` types out of the file format).
    pub created_at: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            thread_id: cp.thread_id.clone(),
            step: cp.step,
            state: cp.state.clone(),
            created_at: cp.created_at.to_rfc3339(),
            metadata: cp.metadata.clone(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            thread_id: p.thread_id,
            step: p.step,
            state: p.state,
            created_at,
            metadata: p.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Checkpoint {
        let mut state = FxHashMap::default();
        state.insert("counter".to_string(), json!(8));
        let mut metadata = FxHashMap::default();
        metadata.insert("graph".to_string(), json!("workflow"));
        Checkpoint {
            thread_id: "t1".into(),
            step: 2,
            state,
            created_at: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let original = sample();
        let persisted = PersistedCheckpoint::from(&original);
        let encoded = serde_json::to_string(&persisted).unwrap();
        let decoded: PersistedCheckpoint = serde_json::from_str(&encoded).unwrap();
        let restored = Checkpoint::from(decoded);
        assert_eq!(restored.thread_id, original.thread_id);
        assert_eq!(restored.step, original.step);
        assert_eq!(restored.state, original.state);
        assert_eq!(restored.metadata, original.metadata);
    }

    #[test]
    fn bad_timestamp_falls_back_to_now() {
        let mut persisted = PersistedCheckpoint::from(&sample());
        persisted.created_at = "not a timestamp".into();
        let restored = Checkpoint::from(persisted);
        assert_eq!(restored.step, 2);
    }
}
