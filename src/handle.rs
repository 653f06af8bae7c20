//! Per-path client façade.
//!
//! A [`PathHandle`] is the public face of one logical file. It holds nothing
//! but its worker's id and the channel into the scheduler: each call builds
//! an op record, submits it, and hands back a ticket. All queueing, descriptor
//! budgeting, and execution happen behind the scheduler.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::SpoolError;
use crate::op::{Op, OpKind, ReadCompletion, ReadTicket, WriteCompletion, WriteTicket};
use crate::store::{Event, SpoolShared, WorkerId};

/// Handle to one logical file in a [`Spool`](crate::Spool).
///
/// Obtained from [`Spool::storage_for`](crate::Spool::storage_for); clones
/// share the same underlying worker. Handles stay valid for the life of the
/// store; ops submitted after the store is dropped fail with
/// [`SpoolError::Shutdown`].
///
/// Ops on one handle are dispatched to the OS in submission order, but
/// completions are not ordered: callers needing read-after-write must wait
/// on the write ticket before issuing the read.
#[derive(Clone, Debug)]
pub struct PathHandle {
    worker: WorkerId,
    shared: Arc<SpoolShared>,
}

impl PathHandle {
    pub(crate) fn new(worker: WorkerId, shared: Arc<SpoolShared>) -> Self {
        Self { worker, shared }
    }

    /// Reads exactly `len` bytes starting at `offset`.
    ///
    /// `len` must be greater than zero. A file shorter than `offset + len`
    /// resolves the ticket to [`OpError::ShortRead`](crate::OpError::ShortRead).
    pub fn read(&self, offset: u64, len: usize) -> Result<ReadTicket, SpoolError> {
        if len == 0 {
            return Err(SpoolError::ZeroSizedRead);
        }
        let (completion, ticket) = ReadCompletion::channel();
        self.submit(Op {
            offset,
            kind: OpKind::Read { len, completion },
        })?;
        Ok(ticket)
    }

    /// Writes `data` starting at `offset`.
    ///
    /// The ticket resolves once every byte is written or the OS reported an
    /// error.
    pub fn write(&self, offset: u64, data: Vec<u8>) -> Result<WriteTicket, SpoolError> {
        let (completion, ticket) = WriteCompletion::channel();
        self.submit(Op {
            offset,
            kind: OpKind::Write { data, completion },
        })?;
        Ok(ticket)
    }

    fn submit(&self, op: Op) -> Result<(), SpoolError> {
        self.shared
            .events
            .send(Event::Submit {
                worker: self.worker,
                op,
            })
            .map_err(|_| SpoolError::Shutdown)?;
        self.shared.stats.ops_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
