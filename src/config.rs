//! Store configuration.
//!
//! [`SpoolConfig`] carries the two required knobs from the public contract
//! (`dir_path`, `max_open_files`) plus the ambient tuning knobs of the
//! threaded implementation. Validation happens in [`Spool::open`]; invalid
//! configurations are a construction-time error, never a panic.
//!
//! [`Spool::open`]: crate::store::Spool::open

use std::path::PathBuf;

use crate::error::SpoolError;

/// Default number of I/O executor threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default capacity of the bounded scheduler-to-I/O request channel.
pub const DEFAULT_IO_QUEUE_CAP: usize = 1024;

/// Configuration for a bounded-FD store.
#[derive(Clone, Debug)]
pub struct SpoolConfig {
    /// Directory under which every logical file lives.
    pub dir_path: PathBuf,
    /// Maximum number of concurrently open file descriptors. Must be >= 1.
    pub max_open_files: usize,
    /// Number of I/O executor threads. Must be >= 1.
    pub io_threads: usize,
    /// Capacity of the scheduler-to-I/O request channel. Must be >= 1.
    ///
    /// Dispatch blocks the scheduler when the channel is full; I/O threads
    /// never block sending completions, so the pair cannot deadlock.
    pub io_queue_cap: usize,
}

impl SpoolConfig {
    /// Creates a configuration with the required fields and default ambient
    /// knobs.
    pub fn new(dir_path: impl Into<PathBuf>, max_open_files: usize) -> Self {
        Self {
            dir_path: dir_path.into(),
            max_open_files,
            io_threads: DEFAULT_IO_THREADS,
            io_queue_cap: DEFAULT_IO_QUEUE_CAP,
        }
    }

    /// Overrides the I/O thread count.
    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads;
        self
    }

    /// Overrides the I/O request channel capacity.
    pub fn with_io_queue_cap(mut self, io_queue_cap: usize) -> Self {
        self.io_queue_cap = io_queue_cap;
        self
    }

    /// Validates the configuration.
    pub(crate) fn validate(&self) -> Result<(), SpoolError> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(SpoolError::invalid_config("dir_path must not be empty"));
        }
        if self.max_open_files == 0 {
            return Err(SpoolError::invalid_config("max_open_files must be >= 1"));
        }
        if self.io_threads == 0 {
            return Err(SpoolError::invalid_config("io_threads must be >= 1"));
        }
        if self.io_queue_cap == 0 {
            return Err(SpoolError::invalid_config("io_queue_cap must be >= 1"));
        }
        Ok(())
    }
}
