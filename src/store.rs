//! The store: a directory-scoped registry of path workers plus the
//! scheduler that rotates a bounded descriptor budget among them.
//!
//! # Architecture
//!
//! ```text
//! client threads                scheduler thread            I/O pool
//! --------------                ----------------            --------
//! storage_for(path) --Register--> worker table
//! handle.read/write --Submit----> worker.add + pull -----> open/pread/
//!                                      ^                    pwrite/close
//!                                      |                        |
//!                                      +----- completions ------+
//! ticket.wait() <------- op results fired from the I/O thread --+
//! ```
//!
//! All worker state and every scheduler structure is mutated from exactly
//! one thread (`fdspool-sched`), which consumes a single event channel. A
//! worker tick is therefore never re-entrant, and `active_workers` is
//! consistently observed at every decision point. Completion callbacks from
//! the original callback-driven design become [`Event`]s; the re-entrant
//! `pull()` of that design becomes notices drained by a flat loop.
//!
//! # Scheduling
//!
//! `pull()` maintains `active_workers <= max_open_files`:
//!
//! - A scheduled worker already heading toward open is left alone; its own
//!   tick picks up the queued ops.
//! - A scheduled worker caught mid-stop is *rescued*: its wish flips back to
//!   `Start` and it serves the new ops without giving up its slot.
//! - A closed worker is started when there is descriptor headroom.
//! - Otherwise the least-recently-idled open worker is evicted (FIFO over
//!   the stoppable queue) and the demander is re-queued at the front; its
//!   start happens once a stop completion frees a slot.
//!
//! Every `start`/`stop`/`open`/`close`/`read`/`write` completion re-enters
//! `pull()`, which gives liveness: stop completions strictly decrease
//! `active_workers`, and the schedule queue is never blocked on its own
//! head. A workload of exactly `max_open_files + 1` hot paths thrashes by
//! design; the store assumes a hot set materially smaller than the budget.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender};

use crate::config::SpoolConfig;
use crate::error::{OpError, SpoolError};
use crate::handle::PathHandle;
use crate::io_pool::{spawn_io_pool, ChannelIo, IoDispatch, IoRequest};
use crate::op::Op;
use crate::stats::{Stats, StatsSnapshot};
use crate::worker::{Control, PathWorker, TickAction, WorkerState};

/// Stable worker identifier: an index into the scheduler's worker table.
///
/// Queues and events carry ids, never references; the scheduler is the sole
/// owner of every worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct WorkerId(u32);

impl WorkerId {
    #[inline]
    pub(crate) fn from_u32(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A message consumed by the scheduler thread.
#[derive(Debug)]
pub(crate) enum Event {
    /// A new short path was registered; create its worker.
    Register { worker: WorkerId, path: PathBuf },
    /// An op was submitted through a handle.
    Submit { worker: WorkerId, op: Op },
    /// The dispatched open (with optional mkdir) finished.
    OpenDone {
        worker: WorkerId,
        result: io::Result<File>,
    },
    /// A dispatched read completed; its result already reached the client.
    ReadFinished { worker: WorkerId },
    /// A dispatched write completed; its result already reached the client.
    WriteFinished { worker: WorkerId },
    /// The dispatched close finished.
    CloseDone { worker: WorkerId },
    /// Begin the graceful drain; the scheduler exits at quiescence.
    Shutdown,
}

/// Deferred scheduler work produced by worker ticks.
///
/// Draining these from a flat loop (instead of recursing into `pull`)
/// bounds stack depth and keeps tick non-reentrancy trivial.
#[derive(Clone, Copy, Debug)]
enum Notice {
    /// The worker drained its queue at `Opened` under `Start`.
    Idle(WorkerId),
    /// The worker reached `Closed` under `Stop`; release its slot.
    Stopped(WorkerId),
}

/// Scheduler core. Single-threaded; the seam to the OS is [`IoDispatch`].
pub(crate) struct Sched {
    max_open_files: usize,
    /// Worker table indexed by `WorkerId`.
    workers: Vec<PathWorker>,
    /// Workers with pending ops awaiting a descriptor, FIFO. The head may be
    /// pushed back to the front when it loses the budget race.
    schedule_queue: VecDeque<WorkerId>,
    /// Idle open workers in eviction order (earliest-idled first).
    stoppable_queue: VecDeque<WorkerId>,
    /// Workers currently counted against the descriptor budget: committed
    /// to start and not yet fully stopped.
    active_workers: usize,
    /// Set by [`Event::Shutdown`]; the event loop exits at quiescence.
    draining: bool,
    stats: Arc<Stats>,
    /// Scratch for tick actions, reused across ticks.
    actions: Vec<TickAction>,
    /// Deferred notifications, drained after every event.
    notices: VecDeque<Notice>,
}

impl Sched {
    pub(crate) fn new(max_open_files: usize, stats: Arc<Stats>) -> Self {
        assert!(max_open_files > 0, "descriptor budget must be >= 1");
        Self {
            max_open_files,
            workers: Vec::new(),
            schedule_queue: VecDeque::new(),
            stoppable_queue: VecDeque::new(),
            active_workers: 0,
            draining: false,
            stats,
            actions: Vec::new(),
            notices: VecDeque::new(),
        }
    }

    /// Handles one event, then drains every deferred notice.
    pub(crate) fn on_event(&mut self, event: Event, io: &mut dyn IoDispatch) {
        match event {
            Event::Register { worker, path } => {
                assert_eq!(
                    worker.index(),
                    self.workers.len(),
                    "registrations must arrive in id order"
                );
                self.workers.push(PathWorker::new(path));
            }
            Event::Submit { worker, op } => self.on_submit(worker, op, io),
            Event::OpenDone { worker, result } => self.on_open_done(worker, result, io),
            Event::ReadFinished { worker } => {
                self.workers[worker.index()].read_finished();
                self.tick(worker, io);
            }
            Event::WriteFinished { worker } => {
                self.workers[worker.index()].write_finished();
                self.tick(worker, io);
            }
            Event::CloseDone { worker } => {
                self.workers[worker.index()].close_finished();
                self.tick(worker, io);
            }
            Event::Shutdown => self.draining = true,
        }
        self.drain_notices(io);
    }

    /// True once a shutdown was requested and no op remains queued or in
    /// flight anywhere.
    pub(crate) fn should_exit(&self) -> bool {
        self.draining && self.workers.iter().all(PathWorker::quiescent)
    }

    fn on_submit(&mut self, id: WorkerId, op: Op, io: &mut dyn IoDispatch) {
        let worker = &mut self.workers[id.index()];
        if let Some(detail) = worker.poison() {
            let path = worker.path().to_string_lossy().into_owned();
            op.fail(OpError::WorkerPoisoned {
                path: path.into(),
                detail: detail.into(),
            });
            return;
        }
        worker.add(op);
        self.tick(id, io);
        self.schedule_queue.push_back(id);
        self.pull(io);
    }

    fn on_open_done(&mut self, id: WorkerId, result: io::Result<File>, io: &mut dyn IoDispatch) {
        match result {
            Ok(file) => {
                self.workers[id.index()].open_succeeded(file);
                self.tick(id, io);
            }
            Err(err) => {
                let worker = &mut self.workers[id.index()];
                let detail = err.to_string().into_boxed_str();
                let orphans = worker.open_failed(detail);
                let path = worker.path().to_string_lossy().into_owned();
                let poison = worker
                    .poison()
                    .expect("open_failed sets the poison detail")
                    .to_owned();
                for op in orphans {
                    op.fail(OpError::WorkerPoisoned {
                        path: path.clone().into(),
                        detail: poison.clone().into(),
                    });
                }
                self.stats.workers_poisoned.fetch_add(1, Ordering::Relaxed);
                // The slot committed at start is released; the store stays
                // live for every other path.
                assert!(self.active_workers > 0, "poisoned worker held no slot");
                self.active_workers -= 1;
                self.pull(io);
            }
        }
    }

    /// Ticks one worker and interprets the actions it emits.
    fn tick(&mut self, id: WorkerId, io: &mut dyn IoDispatch) {
        let mut actions = std::mem::take(&mut self.actions);
        debug_assert!(actions.is_empty());
        self.workers[id.index()].tick(&mut actions);
        for action in actions.drain(..) {
            self.apply(id, action, io);
        }
        self.actions = actions;
    }

    fn apply(&mut self, id: WorkerId, action: TickAction, io: &mut dyn IoDispatch) {
        match action {
            TickAction::BeginOpen { path, create_dir } => io.dispatch(IoRequest::Open {
                worker: id,
                path,
                create_dir,
            }),
            TickAction::Dispatch { file, op } => {
                io.dispatch(IoRequest::from_op(id, file, op));
            }
            TickAction::BeginClose { file } => io.dispatch(IoRequest::Close { worker: id, file }),
            TickAction::Idle => self.notices.push_back(Notice::Idle(id)),
            TickAction::Stopped => self.notices.push_back(Notice::Stopped(id)),
        }
    }

    /// Drains deferred notices; each one re-enters `pull`.
    fn drain_notices(&mut self, io: &mut dyn IoDispatch) {
        while let Some(notice) = self.notices.pop_front() {
            match notice {
                Notice::Idle(id) => {
                    let worker = &mut self.workers[id.index()];
                    debug_assert_eq!(worker.state(), WorkerState::Opened);
                    debug_assert_eq!(worker.control(), Control::Start);
                    if !worker.in_stoppable() {
                        worker.set_in_stoppable(true);
                        self.stoppable_queue.push_back(id);
                    }
                    self.pull(io);
                }
                Notice::Stopped(_) => {
                    assert!(
                        self.active_workers > 0,
                        "stop completion with no active workers"
                    );
                    self.active_workers -= 1;
                    self.pull(io);
                }
            }
        }
    }

    /// The scheduling core: runs until the schedule queue is empty or no
    /// progress can be made this turn.
    fn pull(&mut self, io: &mut dyn IoDispatch) {
        loop {
            if self.schedule_queue.is_empty() {
                return;
            }
            let headroom = self.active_workers < self.max_open_files;
            if !headroom && self.stoppable_queue.is_empty() {
                // Progress resumes when an in-flight stop completes and
                // re-enters pull.
                return;
            }
            let id = self
                .schedule_queue
                .pop_front()
                .expect("schedule queue checked non-empty");
            let worker = &self.workers[id.index()];
            if worker.poison().is_some() {
                // Its ops were already failed; nothing to schedule.
                continue;
            }
            if worker.control() == Control::Start {
                // Already heading toward (or at) Opened; its own tick picks
                // up the queued ops.
                continue;
            }
            if worker.state() != WorkerState::Closed {
                // Mid-stop: rescue. The slot was never released, so the
                // accounting does not change.
                self.stats.workers_rescued.fetch_add(1, Ordering::Relaxed);
                self.workers[id.index()].start();
                self.tick(id, io);
                continue;
            }
            if headroom {
                self.active_workers += 1;
                assert!(
                    self.active_workers <= self.max_open_files,
                    "descriptor budget exceeded"
                );
                self.stats.workers_started.fetch_add(1, Ordering::Relaxed);
                self.workers[id.index()].start();
                self.tick(id, io);
                continue;
            }
            // No headroom: evict the earliest-idled open worker and retry
            // the demander once the freed slot comes back.
            let victim = self
                .stoppable_queue
                .pop_front()
                .expect("stoppable queue checked non-empty");
            debug_assert!(victim != id, "a demander cannot be its own victim");
            self.workers[victim.index()].set_in_stoppable(false);
            self.workers[victim.index()].stop();
            self.stats.workers_evicted.fetch_add(1, Ordering::Relaxed);
            self.tick(victim, io);
            self.schedule_queue.push_front(id);
        }
    }

    #[cfg(test)]
    fn active_workers(&self) -> usize {
        self.active_workers
    }
}

/// Everything a handle needs to reach the scheduler.
#[derive(Debug)]
pub(crate) struct SpoolShared {
    pub(crate) events: Sender<Event>,
    pub(crate) stats: Arc<Stats>,
}

/// A bounded-FD random-access file store.
///
/// Presents many logical files, each addressable by a short relative path,
/// and executes arbitrary positional reads and writes against them while the
/// process never holds more than `max_open_files` descriptors for the store.
///
/// ```no_run
/// use fdspool::{Spool, SpoolConfig};
///
/// let spool = Spool::open(SpoolConfig::new("/var/lib/app/blobs", 64))?;
/// let handle = spool.storage_for("shard-07/chunk-0042")?;
/// handle.write(0, b"hello ".to_vec())?.wait()?;
/// handle.write(6, b"world!".to_vec())?.wait()?;
/// let bytes = handle.read(0, 12)?.wait()?;
/// assert_eq!(&bytes, b"hello world!");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Dropping the store drains every queued and in-flight op, closes all
/// files, and joins its threads.
#[derive(Debug)]
pub struct Spool {
    shared: Arc<SpoolShared>,
    /// short path -> handle; one handle per logical file for the lifetime of
    /// the store.
    registry: Mutex<AHashMap<Box<str>, PathHandle>>,
    dir_path: PathBuf,
    scheduler: Option<JoinHandle<()>>,
    io_workers: Vec<JoinHandle<()>>,
}

impl Spool {
    /// Opens a store rooted at `config.dir_path`.
    ///
    /// The directory itself is created lazily, on the first open of a file
    /// that needs it.
    pub fn open(config: SpoolConfig) -> Result<Self, SpoolError> {
        config.validate()?;

        let stats = Arc::new(Stats::default());
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();
        let (io_tx, io_rx) = crossbeam_channel::bounded::<IoRequest>(config.io_queue_cap);

        let io_workers = spawn_io_pool(
            config.io_threads,
            io_rx,
            event_tx.clone(),
            Arc::clone(&stats),
        )
        .map_err(SpoolError::Spawn)?;

        let sched = Sched::new(config.max_open_files, Arc::clone(&stats));
        let io = ChannelIo::new(io_tx);
        let scheduler = thread::Builder::new()
            .name("fdspool-sched".into())
            .spawn(move || run_scheduler(sched, event_rx, io))
            .map_err(SpoolError::Spawn)?;

        Ok(Self {
            shared: Arc::new(SpoolShared {
                events: event_tx,
                stats,
            }),
            registry: Mutex::new(AHashMap::new()),
            dir_path: config.dir_path,
            scheduler: Some(scheduler),
            io_workers,
        })
    }

    /// Returns the handle for `short_path`, creating its worker on first
    /// request. Idempotent: repeated calls yield handles sharing the same
    /// worker.
    ///
    /// The short path must be relative, non-empty, and free of `.`/`..`
    /// components; it may contain separators, and the intermediate
    /// directories are created on demand.
    pub fn storage_for(&self, short_path: &str) -> Result<PathHandle, SpoolError> {
        validate_short_path(short_path)?;

        let mut registry = lock_registry(&self.registry);
        if let Some(handle) = registry.get(short_path) {
            return Ok(handle.clone());
        }

        assert!(
            registry.len() < u32::MAX as usize,
            "worker id space exhausted"
        );
        let id = WorkerId::from_u32(registry.len() as u32);
        let path = self.dir_path.join(short_path);
        // Sent under the registry lock: registrations reach the scheduler
        // in id order, and always before any submit through the handle.
        self.shared
            .events
            .send(Event::Register { worker: id, path })
            .map_err(|_| SpoolError::Shutdown)?;
        let handle = PathHandle::new(id, Arc::clone(&self.shared));
        registry.insert(short_path.into(), handle.clone());
        Ok(handle)
    }

    /// Point-in-time store counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        // Kick off the graceful drain; the scheduler exits at quiescence,
        // which closes the I/O request channel and winds down the pool.
        let _ = self.shared.events.send(Event::Shutdown);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
        for handle in self.io_workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_scheduler(mut sched: Sched, events: Receiver<Event>, mut io: ChannelIo) {
    while let Ok(event) = events.recv() {
        sched.on_event(event, &mut io);
        if sched.should_exit() {
            break;
        }
    }
    // Dropping `io` here disconnects the request channel; the pool threads
    // finish what they hold and exit. Workers still holding files drop them
    // with the scheduler state.
}

/// Recovers the registry from a poisoned lock; the map itself is always in
/// a consistent state because insertion is the last step under the lock.
fn lock_registry(
    registry: &Mutex<AHashMap<Box<str>, PathHandle>>,
) -> MutexGuard<'_, AHashMap<Box<str>, PathHandle>> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn validate_short_path(short_path: &str) -> Result<(), SpoolError> {
    use std::path::Component;

    if short_path.is_empty() {
        return Err(SpoolError::invalid_short_path(
            short_path,
            "short path must not be empty",
        ));
    }
    for component in std::path::Path::new(short_path).components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => {
                return Err(SpoolError::invalid_short_path(
                    short_path,
                    "parent components are not allowed",
                ));
            }
            Component::CurDir => {
                return Err(SpoolError::invalid_short_path(
                    short_path,
                    "'.' components are not allowed",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SpoolError::invalid_short_path(
                    short_path,
                    "short path must be relative",
                ));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Deterministic scheduler tests
// ============================================================================
