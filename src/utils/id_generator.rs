//! Thread id generation for runs that do not supply one.

use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates process-unique thread ids.
///
/// Ids combine a millisecond timestamp with a process-wide counter, so
/// concurrent runs started in the same millisecond still get distinct ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh thread id, e.g. `thread-1722600000000-0007`.
    #[must_use]
    pub fn generate_thread_id(&self) -> String {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
        format!(
            "thread-{}-{seq:04}",
            chrono::Utc::now().timestamp_millis()
        )
    }
}
