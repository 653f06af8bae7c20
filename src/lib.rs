//! Bounded-FD random-access file store.
//!
//! `fdspool` presents many logical files, each addressable by a short
//! relative path, and executes arbitrary positional reads and writes against
//! them while the process as a whole never holds more than a configured
//! number of open file descriptors for the store. It targets workloads with
//! 10,000+ logical files of which only a small fraction are hot at any
//! moment: the problem is descriptor pressure, not per-file throughput.
//!
//! # Architecture
//!
//! - Every short path owns a **path worker**: a state machine that cycles
//!   between closed and open, queues ops that arrive while its file is not
//!   open, and drains outstanding I/O before closing.
//! - A single-threaded **scheduler** rotates the descriptor budget among
//!   workers: it opens workers on demand, evicts the least-recently-idle
//!   open worker when the budget is exhausted, and rescues a worker caught
//!   mid-close when new ops arrive for it.
//! - A small **I/O pool** executes the actual open/mkdir/pread/pwrite/close
//!   calls and re-enters the scheduler with completions.
//!
//! Reads and writes on one file are dispatched in submission order but run
//! overlapped at the OS; completion order is not guaranteed. Serialize
//! read-after-write by waiting on the write ticket first.
//!
//! # Example
//!
//! ```no_run
//! use fdspool::{Spool, SpoolConfig};
//!
//! let spool = Spool::open(SpoolConfig::new("/var/lib/app/blobs", 64))?;
//! let chunk = spool.storage_for("shard-07/chunk-0042")?;
//! chunk.write(0, b"hello ".to_vec())?.wait()?;
//! chunk.write(6, b"world!".to_vec())?.wait()?;
//! assert_eq!(&chunk.read(0, 12)?.wait()?, b"hello world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Guarantees
//!
//! - Live descriptors never exceed `max_open_files` (observable via
//!   [`StatsSnapshot::peak_open_fds`]).
//! - Every submitted op eventually resolves its ticket, including across a
//!   graceful drop of the store.
//! - At most one handle identity and one worker exist per short path.
//! - Per-file crash durability, op ordering between concurrent ops, and
//!   content caching are explicitly out of scope.

pub mod config;
pub mod error;
pub mod handle;
pub mod op;
pub mod stats;
pub mod store;

mod io_pool;
mod worker;

pub use config::SpoolConfig;
pub use error::{OpError, SpoolError};
pub use handle::PathHandle;
pub use op::{ReadResult, ReadTicket, WriteResult, WriteTicket};
pub use stats::StatsSnapshot;
pub use store::Spool;
