//! Volatile queue of records awaiting delivery.
//!
//! Completed activity records wait here until the next sync cycle. The
//! queue is not persisted; abrupt termination loses its contents, which is
//! mitigated by the periodic sync and the best-effort flush on shutdown.

use crate::types::ActivityRecord;

/// Ordered, append-only buffer of records awaiting delivery.
#[derive(Debug, Default)]
pub struct RecordQueue {
    records: Vec<ActivityRecord>,
}

impl RecordQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn enqueue(&mut self, record: ActivityRecord) {
        self.records.push(record);
    }

    /// Atomically removes and returns all queued records.
    ///
    /// Used exactly once per sync cycle so that records arriving while a
    /// delivery is in flight wait for the next cycle instead of being sent
    /// twice.
    #[must_use]
    pub fn drain(&mut self) -> Vec<ActivityRecord> {
        std::mem::take(&mut self.records)
    }

    /// Returns the number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
