//! I/O executor threads.
//!
//! The scheduler never touches the OS: every open, mkdir, positional read,
//! positional write, and close is dispatched here over a bounded request
//! channel and executed on one of a small pool of `fdspool-io-N` threads.
//! Read/write results are fired straight into the op's completion sink from
//! the I/O thread; the scheduler only sees a counter-decrement event, so op
//! payloads never cross the scheduler channel.
//!
//! The event channel back to the scheduler is unbounded: an I/O thread never
//! blocks while holding finished work, which rules out a send-cycle deadlock
//! with the bounded request channel.
//!
//! Threads exit when the scheduler drops the request sender.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::error::OpError;
use crate::op::{Op, OpKind, ReadCompletion, WriteCompletion};
use crate::stats::Stats;
use crate::store::{Event, WorkerId};

/// A unit of work for the I/O pool.
#[derive(Debug)]
pub(crate) enum IoRequest {
    Open {
        worker: WorkerId,
        path: PathBuf,
        create_dir: bool,
    },
    Read {
        worker: WorkerId,
        file: Arc<File>,
        offset: u64,
        len: usize,
        completion: ReadCompletion,
    },
    Write {
        worker: WorkerId,
        file: Arc<File>,
        offset: u64,
        data: Vec<u8>,
        completion: WriteCompletion,
    },
    Close {
        worker: WorkerId,
        file: Arc<File>,
    },
}

impl IoRequest {
    /// Builds the read/write request for a dispatched op.
    pub(crate) fn from_op(worker: WorkerId, file: Arc<File>, op: Op) -> Self {
        match op.kind {
            OpKind::Read { len, completion } => IoRequest::Read {
                worker,
                file,
                offset: op.offset,
                len,
                completion,
            },
            OpKind::Write { data, completion } => IoRequest::Write {
                worker,
                file,
                offset: op.offset,
                data,
                completion,
            },
        }
    }
}

/// Scheduler-side seam for dispatching I/O.
///
/// Production uses [`ChannelIo`]; scheduler tests substitute a recording
/// double and complete requests by hand.
pub(crate) trait IoDispatch {
    fn dispatch(&mut self, req: IoRequest);
}

/// Dispatches requests over the bounded channel to the thread pool.
pub(crate) struct ChannelIo {
    tx: Sender<IoRequest>,
}

impl ChannelIo {
    pub(crate) fn new(tx: Sender<IoRequest>) -> Self {
        Self { tx }
    }
}

impl IoDispatch for ChannelIo {
    fn dispatch(&mut self, req: IoRequest) {
        // Blocking here is backpressure on the scheduler. A send can only
        // fail after the pool threads have exited, which happens after the
        // scheduler drops this sender; completions for a dropped request
        // are delivered by the completion sink's Drop impl.
        let _ = self.tx.send(req);
    }
}

/// Spawns the I/O pool. Threads exit when `requests` disconnects.
pub(crate) fn spawn_io_pool(
    threads: usize,
    requests: Receiver<IoRequest>,
    events: Sender<Event>,
    stats: Arc<Stats>,
) -> io::Result<Vec<JoinHandle<()>>> {
    assert!(threads > 0, "io pool requires at least one thread");
    let mut handles = Vec::with_capacity(threads);
    for idx in 0..threads {
        let rx = requests.clone();
        let tx = events.clone();
        let stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name(format!("fdspool-io-{idx}"))
            .spawn(move || run_io_worker(rx, tx, stats))
            .map_err(io::Error::other)?;
        handles.push(handle);
    }
    Ok(handles)
}

fn run_io_worker(requests: Receiver<IoRequest>, events: Sender<Event>, stats: Arc<Stats>) {
    // Event sends ignore disconnects: the scheduler is gone and the results
    // have nowhere to land, which is fine during teardown.
    for req in requests.iter() {
        match req {
            IoRequest::Open {
                worker,
                path,
                create_dir,
            } => {
                let result = open_path(&path, create_dir, &stats);
                let _ = events.send(Event::OpenDone { worker, result });
            }
            IoRequest::Read {
                worker,
                file,
                offset,
                len,
                completion,
            } => {
                let result = read_exact_at(&file, offset, len);
                match &result {
                    Ok(_) => {
                        stats.reads_completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(OpError::ShortRead { .. }) => {
                        stats.short_reads.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        stats.io_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                completion.fire(result);
                // Release our handle before the scheduler learns the read is
                // done: when in-flight hits zero the worker's reference must
                // be the last.
                drop(file);
                let _ = events.send(Event::ReadFinished { worker });
            }
            IoRequest::Write {
                worker,
                file,
                offset,
                data,
                completion,
            } => {
                let result = write_exact_at(&file, offset, &data);
                match &result {
                    Ok(()) => {
                        stats.writes_completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        stats.io_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                completion.fire(result);
                drop(file);
                let _ = events.send(Event::WriteFinished { worker });
            }
            IoRequest::Close { worker, file } => {
                close_file(file, &stats);
                let _ = events.send(Event::CloseDone { worker });
            }
        }
    }
}

/// Opens read-write with create-if-missing semantics; never truncates.
///
/// On the worker's first open the enclosing directory is created first
/// (recursive, idempotent).
fn open_path(path: &Path, create_dir: bool, stats: &Stats) -> io::Result<File> {
    if create_dir {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                stats.dir_creates.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    stats.record_open();
    Ok(file)
}

/// Closes the worker's file, observing the close result where the platform
/// allows it.
fn close_file(file: Arc<File>, stats: &Stats) {
    match Arc::try_unwrap(file) {
        Ok(file) => {
            if close_raw(file).is_err() {
                stats.io_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(shared) => {
            // The scheduler only initiates a close at in-flight zero, so the
            // reference it sends must be the last.
            debug_assert!(false, "close dispatched with I/O still in flight");
            drop(shared);
        }
    }
    stats.record_close();
}

#[cfg(unix)]
fn close_raw(file: File) -> io::Result<()> {
    use std::os::unix::io::IntoRawFd;
    let fd = file.into_raw_fd();
    // SAFETY: `fd` was just released from the File and is closed exactly
    // once here.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn close_raw(file: File) -> io::Result<()> {
    drop(file);
    Ok(())
}

/// One positional read, re-issued only on EINTR.
///
/// The contract is "exactly `len` bytes at `offset`": anything less,
/// including zero at EOF, surfaces as [`OpError::ShortRead`]. There is no
/// continuation of partial reads.
fn read_exact_at(file: &File, offset: u64, len: usize) -> Result<Vec<u8>, OpError> {
    debug_assert!(len > 0, "zero-sized reads are rejected at the handle");
    let mut buf = vec![0u8; len];
    let got = loop {
        match pread(file, &mut buf, offset) {
            Ok(n) => break n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(OpError::Io(err)),
        }
    };
    if got < len {
        return Err(OpError::ShortRead {
            requested: len,
            got,
        });
    }
    debug_assert_eq!(got, len);
    Ok(buf)
}

/// One positional write, re-issued only on EINTR.
///
/// A partial write without an error breaks the contract and asserts.
fn write_exact_at(file: &File, offset: u64, data: &[u8]) -> Result<(), OpError> {
    let written = loop {
        match pwrite(file, data, offset) {
            Ok(n) => break n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(OpError::Io(err)),
        }
    };
    assert_eq!(
        written,
        data.len(),
        "positional write completed short without an error"
    );
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(data, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, data: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(data, offset)
}
