//! Op records, one-shot completions, and client-facing tickets.
//!
//! An [`Op`] is the tagged value a handle submits: a positional read or
//! write plus a completion sink. Completions are strictly one-shot: each
//! fires exactly once, and a completion dropped unfired (a teardown race)
//! delivers [`OpError::Shutdown`] from its `Drop` impl so a waiting client
//! can never hang.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::OpError;

/// Result type delivered to a read ticket.
pub type ReadResult = Result<Vec<u8>, OpError>;
/// Result type delivered to a write ticket.
pub type WriteResult = Result<(), OpError>;

/// A positional I/O request queued on a path worker.
#[derive(Debug)]
pub(crate) struct Op {
    /// Absolute byte offset within the file.
    pub(crate) offset: u64,
    pub(crate) kind: OpKind,
}

/// The read/write halves of an op.
#[derive(Debug)]
pub(crate) enum OpKind {
    /// Read exactly `len` bytes into a fresh buffer.
    Read {
        len: usize,
        completion: ReadCompletion,
    },
    /// Write the caller's bytes.
    Write {
        data: Vec<u8>,
        completion: WriteCompletion,
    },
}

impl Op {
    /// Returns `true` for read ops.
    #[inline]
    pub(crate) fn is_read(&self) -> bool {
        matches!(self.kind, OpKind::Read { .. })
    }

    /// Completes the op with an error without executing it.
    pub(crate) fn fail(self, err: OpError) {
        match self.kind {
            OpKind::Read { completion, .. } => completion.fire(Err(err)),
            OpKind::Write { completion, .. } => completion.fire(Err(err)),
        }
    }
}

/// One-shot sink for a read result.
#[derive(Debug)]
pub(crate) struct ReadCompletion {
    tx: Option<Sender<ReadResult>>,
}

impl ReadCompletion {
    /// Creates a completion/ticket pair.
    pub(crate) fn channel() -> (Self, ReadTicket) {
        let (tx, rx) = bounded(1);
        (Self { tx: Some(tx) }, ReadTicket { rx })
    }

    /// Delivers the result. Consumes the sink; a second fire is impossible.
    pub(crate) fn fire(mut self, result: ReadResult) {
        let tx = self.tx.take();
        debug_assert!(tx.is_some(), "completion fired twice");
        if let Some(tx) = tx {
            // The client may have dropped its ticket; that is its business.
            let _ = tx.send(result);
        }
    }
}

impl Drop for ReadCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(OpError::Shutdown));
        }
    }
}

/// One-shot sink for a write result.
#[derive(Debug)]
pub(crate) struct WriteCompletion {
    tx: Option<Sender<WriteResult>>,
}

impl WriteCompletion {
    /// Creates a completion/ticket pair.
    pub(crate) fn channel() -> (Self, WriteTicket) {
        let (tx, rx) = bounded(1);
        (Self { tx: Some(tx) }, WriteTicket { rx })
    }

    /// Delivers the result. Consumes the sink; a second fire is impossible.
    pub(crate) fn fire(mut self, result: WriteResult) {
        let tx = self.tx.take();
        debug_assert!(tx.is_some(), "completion fired twice");
        if let Some(tx) = tx {
            let _ = tx.send(result);
        }
    }
}

impl Drop for WriteCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(OpError::Shutdown));
        }
    }
}

/// Receiver for an in-flight read.
///
/// Dropping the ticket abandons the result; the op still runs.
#[derive(Debug)]
#[must_use = "a read ticket resolves to the bytes read; dropping it discards them"]
pub struct ReadTicket {
    rx: Receiver<ReadResult>,
}

impl ReadTicket {
    /// Blocks until the read completes.
    pub fn wait(self) -> ReadResult {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(OpError::Shutdown),
        }
    }

    /// Returns the result if the read has completed, without blocking.
    pub fn try_wait(&self) -> Option<ReadResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(OpError::Shutdown)),
        }
    }
}

/// Receiver for an in-flight write.
///
/// Dropping the ticket abandons the result; the op still runs.
#[derive(Debug)]
#[must_use = "a write ticket resolves to the write outcome; dropping it discards errors"]
pub struct WriteTicket {
    rx: Receiver<WriteResult>,
}

impl WriteTicket {
    /// Blocks until the write completes.
    pub fn wait(self) -> WriteResult {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(OpError::Shutdown),
        }
    }

    /// Returns the result if the write has completed, without blocking.
    pub fn try_wait(&self) -> Option<WriteResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(OpError::Shutdown)),
        }
    }
}
