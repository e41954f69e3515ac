//! Upgrade progress reporting.

/// Read-only view of the upgrade counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProgressSnapshot {
    /// Sync bytes seen so far (preamble plus noise during transfer).
    pub sync_count: u32,
    /// Low-half cursor, `-1` before its length byte.
    pub low_cursor: i64,
    /// High-half cursor, `-1` before its length byte.
    pub high_cursor: i64,
    /// Total image length.
    pub total_length: usize,
    /// Bytes that were neither sync bytes nor transfer tokens.
    pub unknown_count: u32,
    /// The upgrade finished successfully.
    pub done: bool,
    /// The byte transfer phase is running.
    pub transferring: bool,
}

impl ProgressSnapshot {
    /// Payload bytes sent across both halves.
    pub fn bytes_sent(&self) -> usize {
        let sent = |cursor: i64| usize::try_from(cursor).unwrap_or(0);
        sent(self.low_cursor) + sent(self.high_cursor)
    }
}

/// Receives a snapshot after every protocol step.
///
/// Observation is one-way: nothing an observer does feeds back into the
/// transfer.
pub trait ProgressObserver {
    /// Called with the current counters.
    fn on_progress(&mut self, snapshot: &ProgressSnapshot);
}

/// Observer that ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Adapter turning a closure into an observer.
pub struct FnProgress<F>(pub F);

impl<F: FnMut(&ProgressSnapshot)> ProgressObserver for FnProgress<F> {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        (self.0)(snapshot);
    }
}
