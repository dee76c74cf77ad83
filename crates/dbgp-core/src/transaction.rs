//! Transaction id allocation and reply demultiplexing.
//!
//! Every request gets a fresh id. A waiter registers the id before the
//! request leaves, and the transport thread hands each reply to the waiter
//! holding its id, whatever order the replies arrive in.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::error::{DbgpError, DbgpResult};
use crate::protocol::{Reply, TransactionId};

/// Monotonic per-session transaction id source, starting at 1.
#[derive(Debug)]
pub struct TransactionAllocator {
    next: AtomicU32,
}

impl Default for TransactionAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// What happened to a reply handed to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A waiter was registered for the id.
    Delivered,
    /// The id was registered as fire-and-forget, or the router is closed.
    Discarded,
    /// Nobody asked for this id.
    Unexpected,
}

#[derive(Debug, Default)]
struct RouterState {
    pending: HashMap<TransactionId, Sender<Reply>>,
    discarded: HashSet<TransactionId>,
    closed: Option<SmolStr>,
}

/// Matches replies to the waiters that registered their transaction ids.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    state: Mutex<RouterState>,
}

impl ReplyRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the reply for `id`.
    pub fn register(&self, id: TransactionId) -> DbgpResult<PendingReply> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(DbgpError::Transport(reason.clone()));
        }
        let (tx, rx) = bounded(1);
        state.pending.insert(id, tx);
        Ok(PendingReply { id, rx })
    }

    /// Expect a reply for `id` but drop it on arrival.
    pub fn discard(&self, id: TransactionId) {
        let mut state = self.state.lock();
        state.pending.remove(&id);
        state.discarded.insert(id);
    }

    /// Forget a registration whose request never made it out.
    pub fn cancel(&self, id: TransactionId) {
        self.state.lock().pending.remove(&id);
    }

    pub fn route(&self, reply: Reply) -> RouteOutcome {
        let id = reply.transaction_id;
        let mut state = self.state.lock();
        if state.closed.is_some() {
            debug!(transaction = %id, "reply after close");
            return RouteOutcome::Discarded;
        }
        if let Some(tx) = state.pending.remove(&id) {
            drop(state);
            if tx.send(reply).is_err() {
                debug!(transaction = %id, "reply waiter already gone");
            }
            return RouteOutcome::Delivered;
        }
        if state.discarded.remove(&id) {
            debug!(transaction = %id, "discarded reply");
            return RouteOutcome::Discarded;
        }
        warn!(transaction = %id, "reply for unknown transaction");
        RouteOutcome::Unexpected
    }

    /// Fail every outstanding and future wait.
    pub fn close(&self, reason: impl Into<SmolStr>) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(reason.into());
        }
        // Dropping the senders wakes every waiter with a disconnect.
        state.pending.clear();
        state.discarded.clear();
    }

    #[must_use]
    pub fn closed_reason(&self) -> Option<SmolStr> {
        self.state.lock().closed.clone()
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Receiving half for one transaction.
#[derive(Debug)]
pub struct PendingReply {
    id: TransactionId,
    rx: Receiver<Reply>,
}

impl PendingReply {
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Block for the reply; `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> DbgpResult<Reply> {
        let closed = || DbgpError::transport("connection closed before reply arrived");
        match timeout {
            None => self.rx.recv().map_err(|_| closed()),
            Some(limit) => self.rx.recv_timeout(limit).map_err(|err| match err {
                RecvTimeoutError::Timeout => DbgpError::Timeout(self.id),
                RecvTimeoutError::Disconnected => closed(),
            }),
        }
    }

    /// Non-blocking check used to poll a continuation.
    pub fn try_take(&self) -> Option<DbgpResult<Reply>> {
        match self.rx.try_recv() {
            Ok(reply) => Some(Ok(reply)),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => Some(Err(
                DbgpError::transport("connection closed before reply arrived"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyBody;

    fn reply(id: u32) -> Reply {
        Reply::new(TransactionId(id), ReplyBody::Success(true))
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let alloc = TransactionAllocator::new();
        assert_eq!(alloc.next_id(), TransactionId(1));
        assert_eq!(alloc.next_id(), TransactionId(2));
        assert_eq!(alloc.next_id(), TransactionId(3));
    }

    #[test]
    fn replies_reach_their_own_waiter_in_any_order() {
        let router = ReplyRouter::new();
        let first = router.register(TransactionId(1)).unwrap();
        let second = router.register(TransactionId(2)).unwrap();
        assert_eq!(router.route(reply(2)), RouteOutcome::Delivered);
        assert_eq!(router.route(reply(1)), RouteOutcome::Delivered);
        let timeout = Some(Duration::from_millis(10));
        assert_eq!(first.wait(timeout).unwrap().transaction_id, TransactionId(1));
        assert_eq!(second.wait(timeout).unwrap().transaction_id, TransactionId(2));
        assert_eq!(router.outstanding(), 0);
    }

    #[test]
    fn discarded_and_unknown_replies() {
        let router = ReplyRouter::new();
        router.discard(TransactionId(4));
        assert_eq!(router.route(reply(4)), RouteOutcome::Discarded);
        assert_eq!(router.route(reply(4)), RouteOutcome::Unexpected);
    }

    #[test]
    fn wait_times_out() {
        let router = ReplyRouter::new();
        let pending = router.register(TransactionId(9)).unwrap();
        assert_eq!(
            pending.wait(Some(Duration::from_millis(5))),
            Err(DbgpError::Timeout(TransactionId(9)))
        );
    }

    #[test]
    fn close_wakes_waiters_and_rejects_new_registrations() {
        let router = ReplyRouter::new();
        let pending = router.register(TransactionId(1)).unwrap();
        router.close("peer hung up");
        assert!(matches!(pending.wait(None), Err(DbgpError::Transport(_))));
        assert_eq!(
            router.register(TransactionId(2)).unwrap_err(),
            DbgpError::Transport("peer hung up".into())
        );
    }
}
