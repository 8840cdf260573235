//! The Request Object (C2) — a pending operation with its delivery channels.
//!
//! A `Request<Op>` is owned by exactly one in-flight HTTP handler for its
//! full lifetime. The handler builds it with two fresh single-slot
//! channels, hands it to the [`super::batcher::Batcher`], and blocks on
//! [`ResponseHandle::wait`]. Exactly one of the two channels is signaled
//! exactly once before the request is considered complete — the batcher
//! never sends on both.

use std::hash::Hash;

use tokio::sync::oneshot;

use crate::error::AgentError;

/// The closed set of operations a single backend family supports, plus the
/// equivalence key that defines coalescing (spec.md §3's grouping table).
pub trait Operation: Clone + Send + Sync + 'static {
    /// Equivalence key for grouping within one batch. `None` means the
    /// operation is unrecognized and must fail without a backend call.
    type GroupKey: Clone + Eq + Hash + Send + Sync;

    /// The success payload delivered to every member of a group.
    type Output: Clone + Send + Sync;

    fn group_key(&self) -> Option<Self::GroupKey>;
}

/// A pending operation plus its two single-slot delivery channels.
pub struct Request<Op: Operation> {
    pub op: Op,
    result_tx: oneshot::Sender<Op::Output>,
    error_tx: oneshot::Sender<AgentError>,
}

/// Held by the HTTP handler; resolves once the batcher delivers to either
/// channel.
pub struct ResponseHandle<Op: Operation> {
    result_rx: oneshot::Receiver<Op::Output>,
    error_rx: oneshot::Receiver<AgentError>,
}

impl<Op: Operation> Request<Op> {
    /// Build a fresh request and its matching handle.
    pub fn new(op: Op) -> (Self, ResponseHandle<Op>) {
        let (result_tx, result_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        (
            Request { op, result_tx, error_tx },
            ResponseHandle { result_rx, error_rx },
        )
    }

    /// Deliver a success payload. Best-effort: if the handler already gave
    /// up (e.g. the connection dropped), the send is simply discarded.
    pub fn complete(self, result: std::result::Result<Op::Output, AgentError>) {
        match result {
            Ok(value) => {
                let _ = self.result_tx.send(value);
            },
            Err(err) => {
                let _ = self.error_tx.send(err);
            },
        }
    }

    /// Fail immediately with the given error, without ever consulting an
    /// executor. Used for `UnsupportedOperation` and `ShuttingDown`.
    pub fn fail(self, err: AgentError) {
        let _ = self.error_tx.send(err);
    }
}

impl<Op: Operation> ResponseHandle<Op> {
    /// Wait for whichever of the two channels is signaled first.
    pub async fn wait(self) -> std::result::Result<Op::Output, AgentError> {
        tokio::select! {
            biased;
            Ok(value) = self.result_rx => Ok(value),
            Ok(err) = self.error_rx => Err(err),
            else => Err(AgentError::Backend("delivery channel closed without a response".into())),
        }
    }
}
