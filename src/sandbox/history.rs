//! Append-only ledger of execution attempts.
//!
//! Every call to the engine produces exactly one record here, whatever its
//! outcome. The ledger grows unbounded for the life of the process; callers
//! read it through a bounded `recent` window.

use crate::sandbox::executor::ExecutionRecord;

/// Window size used when `recent` is called without a limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Largest window `recent` will return.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// The ledger itself. The engine wraps it in a mutex; the type is plain
/// single-threaded state.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Records are never mutated or reordered after this.
    pub fn append(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// The most recent records, oldest of the window first.
    ///
    /// `limit` defaults to [`DEFAULT_HISTORY_LIMIT`] and is clamped to
    /// [`MAX_HISTORY_LIMIT`]; asking for more than exists returns everything.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);
        let start = self.records.len().saturating_sub(limit);
        self.records[start..].to_vec()
    }

    /// Drop all records, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Total records appended since the last clear.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
