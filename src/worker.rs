//! Per-path worker state machine.
//!
//! Each logical file is owned by one `PathWorker` that cycles between closed
//! and open, queues ops that arrive while its file is not open, and drains
//! outstanding I/O before closing. The worker is pure policy: it never
//! touches the OS. Every transition that needs the outside world is emitted
//! as a [`TickAction`] for the scheduler to interpret, which keeps the
//! machine deterministic and directly testable.
//!
//! # State machine
//!
//! ```text
//!            control = Start                    control = Stop
//!   Closed ----------------> Opening    Opened -----------> Draining
//!   Opening --(open done)--> Opened     Draining --(idle)-> Closing
//!   Draining --(rescue)----> Opened     Closing -(closed)-> Closed
//! ```
//!
//! `control` is the scheduler's current wish; `state` is the observed
//! lifecycle. The two disagree transiently: a draining worker whose wish
//! flips back to `Start` is *rescued* and returns to `Opened` without an
//! open/close cycle (unless the close was already initiated, in which case
//! it reopens after the close lands).
//!
//! # Invariants
//!
//! - The file handle is held iff `state ∈ {Opened, Draining, Closing}`.
//! - At most one stop notification is pending; a rescue cancels it so the
//!   scheduler's budget slot is released exactly once per real stop.
//! - Queued ops are dispatched in FIFO submission order; reads and writes
//!   overlap at the OS once dispatched.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::op::Op;

/// The scheduler's current wish for a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Control {
    Start,
    Stop,
}

/// Observed lifecycle of a worker's file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Closed,
    Opening,
    Opened,
    Draining,
    Closing,
}

/// Instruction emitted by a tick for the scheduler to interpret.
#[derive(Debug)]
pub(crate) enum TickAction {
    /// Dispatch an open (plus a recursive mkdir on the first open).
    BeginOpen { path: PathBuf, create_dir: bool },
    /// Dispatch one positional op against the open file.
    Dispatch { file: Arc<File>, op: Op },
    /// Dispatch the close of the worker's file.
    BeginClose { file: Arc<File> },
    /// The worker drained its queue at `Opened` under `Start`; it is a
    /// candidate for eviction.
    Idle,
    /// The worker reached `Closed` under `Stop`; its budget slot is free.
    Stopped,
}

/// Per-path state machine. Owned and driven exclusively by the scheduler.
#[derive(Debug)]
pub(crate) struct PathWorker {
    /// Fully-qualified path of the backing file.
    path: PathBuf,
    control: Control,
    state: WorkerState,
    /// Held iff `state ∈ {Opened, Draining, Closing}`. Dispatched ops carry
    /// clones; the worker's reference is the last one standing when a close
    /// is initiated.
    file: Option<Arc<File>>,
    /// FIFO queue of ops awaiting dispatch.
    ops: VecDeque<Op>,
    in_flight_reads: u32,
    in_flight_writes: u32,
    /// Pending stop notification (at most one).
    notify_stopped: bool,
    /// Sticky: the enclosing directory has been created this process
    /// lifetime.
    dir_ready: bool,
    /// Set when an open or mkdir failed; rendering of the failure.
    poison: Option<Box<str>>,
    /// Scheduler-maintained: the worker currently sits on the stoppable
    /// queue.
    in_stoppable: bool,
}

impl PathWorker {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            control: Control::Stop,
            state: WorkerState::Closed,
            file: None,
            ops: VecDeque::new(),
            in_flight_reads: 0,
            in_flight_writes: 0,
            notify_stopped: false,
            dir_ready: false,
            poison: None,
            in_stoppable: false,
        }
    }

    #[inline]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    #[inline]
    pub(crate) fn control(&self) -> Control {
        self.control
    }

    #[inline]
    pub(crate) fn in_flight(&self) -> u32 {
        self.in_flight_reads + self.in_flight_writes
    }

    #[inline]
    pub(crate) fn poison(&self) -> Option<&str> {
        self.poison.as_deref()
    }

    #[inline]
    pub(crate) fn in_stoppable(&self) -> bool {
        self.in_stoppable
    }

    #[inline]
    pub(crate) fn set_in_stoppable(&mut self, value: bool) {
        self.in_stoppable = value;
    }

    /// Nothing queued, nothing in flight. Used by the drain-on-drop path.
    #[inline]
    pub(crate) fn quiescent(&self) -> bool {
        self.ops.is_empty() && self.in_flight() == 0
    }

    /// Appends an op to the pending queue. The caller ticks afterwards.
    pub(crate) fn add(&mut self, op: Op) {
        debug_assert!(self.poison.is_none(), "ops must not reach a poisoned worker");
        self.ops.push_back(op);
    }

    /// Flips the wish to `Start`.
    ///
    /// A fresh start targets a closed worker whose previous stop fully
    /// completed. A rescue targets a mid-stop worker; the interrupted stop's
    /// pending notification is cancelled so the budget slot it still holds
    /// is not released.
    pub(crate) fn start(&mut self) {
        assert_eq!(self.control, Control::Stop, "start() requires a stop wish");
        if self.state == WorkerState::Closed {
            assert!(
                !self.notify_stopped,
                "fresh start with a stop notification pending"
            );
        } else {
            assert!(
                self.notify_stopped,
                "rescue requires an interrupted stop in progress"
            );
            self.notify_stopped = false;
        }
        self.control = Control::Start;
    }

    /// Flips the wish to `Stop` and arms the stop notification.
    ///
    /// Only idle opened workers are evicted; the scheduler guarantees the
    /// target came off the stoppable queue.
    pub(crate) fn stop(&mut self) {
        assert_eq!(self.control, Control::Start, "stop() requires a start wish");
        assert_eq!(
            self.state,
            WorkerState::Opened,
            "only opened workers are evicted"
        );
        assert!(!self.notify_stopped, "stop notification already pending");
        self.control = Control::Stop;
        self.notify_stopped = true;
    }

    /// Runs the state machine to a fixed point, emitting actions.
    pub(crate) fn tick(&mut self, out: &mut Vec<TickAction>) {
        if self.poison.is_some() {
            return;
        }
        loop {
            match (self.control, self.state) {
                (Control::Start, WorkerState::Closed) => {
                    self.state = WorkerState::Opening;
                    out.push(TickAction::BeginOpen {
                        path: self.path.clone(),
                        create_dir: !self.dir_ready,
                    });
                    return;
                }
                (Control::Start, WorkerState::Opening | WorkerState::Closing) => return,
                (Control::Start, WorkerState::Opened) => {
                    self.exec_ops(out);
                    debug_assert!(self.ops.is_empty());
                    out.push(TickAction::Idle);
                    return;
                }
                (Control::Start, WorkerState::Draining) => {
                    // Rescued before the close was initiated.
                    self.state = WorkerState::Opened;
                }
                (Control::Stop, WorkerState::Opened) => {
                    // Drain the queue one last time before heading down.
                    self.exec_ops(out);
                    self.state = WorkerState::Draining;
                }
                (Control::Stop, WorkerState::Draining) => {
                    if self.in_flight() == 0 {
                        self.state = WorkerState::Closing;
                        let file = self.file.take();
                        assert!(file.is_some(), "closing worker must hold its file");
                        if let Some(file) = file {
                            out.push(TickAction::BeginClose { file });
                        }
                    }
                    return;
                }
                (Control::Stop, WorkerState::Opening | WorkerState::Closing) => return,
                (Control::Stop, WorkerState::Closed) => {
                    if self.notify_stopped {
                        self.notify_stopped = false;
                        out.push(TickAction::Stopped);
                    }
                    return;
                }
            }
        }
    }

    /// Dispatches every queued op against the open file without awaiting
    /// completions; reads and writes overlap at the OS.
    fn exec_ops(&mut self, out: &mut Vec<TickAction>) {
        debug_assert!(matches!(
            self.state,
            WorkerState::Opened | WorkerState::Draining
        ));
        while let Some(op) = self.ops.pop_front() {
            let file = self.file.as_ref();
            assert!(file.is_some(), "dispatching op without an open file");
            let Some(file) = file else { return };
            if op.is_read() {
                self.in_flight_reads += 1;
            } else {
                self.in_flight_writes += 1;
            }
            out.push(TickAction::Dispatch {
                file: Arc::clone(file),
                op,
            });
        }
    }

    /// The dispatched open landed. The caller ticks afterwards.
    pub(crate) fn open_succeeded(&mut self, file: File) {
        assert_eq!(self.state, WorkerState::Opening);
        assert!(self.file.is_none());
        self.file = Some(Arc::new(file));
        self.dir_ready = true;
        self.state = WorkerState::Opened;
    }

    /// The dispatched open (or its mkdir) failed: the worker is poisoned.
    ///
    /// Returns the queued ops for the scheduler to fail; the worker holds no
    /// file and no longer counts against the budget.
    pub(crate) fn open_failed(&mut self, detail: Box<str>) -> VecDeque<Op> {
        assert_eq!(self.state, WorkerState::Opening);
        assert!(self.file.is_none());
        assert_eq!(self.in_flight(), 0);
        self.poison = Some(detail);
        self.state = WorkerState::Closed;
        self.control = Control::Stop;
        self.notify_stopped = false;
        std::mem::take(&mut self.ops)
    }

    /// The dispatched close landed. The caller ticks afterwards.
    pub(crate) fn close_finished(&mut self) {
        assert_eq!(self.state, WorkerState::Closing);
        assert!(self.file.is_none());
        self.state = WorkerState::Closed;
    }

    /// A dispatched read completed (either way). The caller ticks afterwards.
    pub(crate) fn read_finished(&mut self) {
        assert!(self.in_flight_reads > 0, "read completion without dispatch");
        self.in_flight_reads -= 1;
    }

    /// A dispatched write completed (either way). The caller ticks
    /// afterwards.
    pub(crate) fn write_finished(&mut self) {
        assert!(
            self.in_flight_writes > 0,
            "write completion without dispatch"
        );
        self.in_flight_writes -= 1;
    }

    /// Checks the file-holding invariant. Test builds only.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let should_hold_file = matches!(
            self.state,
            WorkerState::Opened | WorkerState::Draining | WorkerState::Closing
        );
        assert_eq!(
            self.file.is_some(),
            should_hold_file,
            "file handle held in {:?}",
            self.state
        );
        if self.poison.is_some() {
            assert_eq!(self.state, WorkerState::Closed);
            assert!(self.ops.is_empty());
        }
    }
}
