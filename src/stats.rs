//! Cheap store observability counters.
//!
//! Counters are shared atomics updated from the scheduler and I/O threads;
//! [`StatsSnapshot`] is a point-in-time copy for tests and callers. Hot-path
//! updates are `Relaxed`; the live FD gauge and its peak use `SeqCst` so the
//! `peak_open_fds <= max_open_files` invariant is observable across threads.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counter block. One per store, behind an `Arc`.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    /// Currently open file descriptors (gauge).
    pub(crate) open_fds: AtomicU64,
    /// High-water mark of `open_fds`.
    pub(crate) peak_open_fds: AtomicU64,
    /// Successful opens.
    pub(crate) files_opened: AtomicU64,
    /// Completed closes.
    pub(crate) files_closed: AtomicU64,
    /// Recursive directory-creation calls issued before an open.
    pub(crate) dir_creates: AtomicU64,
    /// Ops accepted at the handle boundary.
    pub(crate) ops_submitted: AtomicU64,
    /// Reads completed successfully.
    pub(crate) reads_completed: AtomicU64,
    /// Writes completed successfully.
    pub(crate) writes_completed: AtomicU64,
    /// Reads that returned fewer bytes than requested.
    pub(crate) short_reads: AtomicU64,
    /// OS-level read/write/close failures.
    pub(crate) io_errors: AtomicU64,
    /// Workers committed to the FD budget (fresh starts).
    pub(crate) workers_started: AtomicU64,
    /// Workers evicted from the stoppable queue to free a descriptor.
    pub(crate) workers_evicted: AtomicU64,
    /// Draining workers reclaimed by new demand before they closed.
    pub(crate) workers_rescued: AtomicU64,
    /// Workers poisoned by an open or mkdir failure.
    pub(crate) workers_poisoned: AtomicU64,
}

impl Stats {
    /// Records a successful open and updates the live/peak FD gauges.
    pub(crate) fn record_open(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
        let live = self.open_fds.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open_fds.fetch_max(live, Ordering::SeqCst);
    }

    /// Records a completed close.
    pub(crate) fn record_close(&self) {
        self.files_closed.fetch_add(1, Ordering::Relaxed);
        let prev = self.open_fds.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "close recorded with no open descriptors");
    }

    /// Takes a point-in-time snapshot.
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            open_fds: self.open_fds.load(Ordering::SeqCst),
            peak_open_fds: self.peak_open_fds.load(Ordering::SeqCst),
            files_opened: self.files_opened.load(Ordering::Relaxed),
            files_closed: self.files_closed.load(Ordering::Relaxed),
            dir_creates: self.dir_creates.load(Ordering::Relaxed),
            ops_submitted: self.ops_submitted.load(Ordering::Relaxed),
            reads_completed: self.reads_completed.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            workers_evicted: self.workers_evicted.load(Ordering::Relaxed),
            workers_rescued: self.workers_rescued.load(Ordering::Relaxed),
            workers_poisoned: self.workers_poisoned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the store counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Currently open file descriptors.
    pub open_fds: u64,
    /// High-water mark of concurrently open descriptors.
    pub peak_open_fds: u64,
    /// Successful opens.
    pub files_opened: u64,
    /// Completed closes.
    pub files_closed: u64,
    /// Directory-creation calls issued before an open.
    pub dir_creates: u64,
    /// Ops accepted at the handle boundary.
    pub ops_submitted: u64,
    /// Reads completed successfully.
    pub reads_completed: u64,
    /// Writes completed successfully.
    pub writes_completed: u64,
    /// Reads that returned fewer bytes than requested.
    pub short_reads: u64,
    /// OS-level read/write/close failures.
    pub io_errors: u64,
    /// Workers committed to the FD budget.
    pub workers_started: u64,
    /// Workers evicted to free a descriptor.
    pub workers_evicted: u64,
    /// Draining workers reclaimed by new demand before closing.
    pub workers_rescued: u64,
    /// Workers poisoned by an open or mkdir failure.
    pub workers_poisoned: u64,
}
