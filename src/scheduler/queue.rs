//! Global inbound queue.
//!
//! A mutex-guarded FIFO with a condition-variable wake signal. The
//! accept layer and re-queueing workers write; the watcher thread is the
//! only reader. The `open` flag lives under the same mutex as the items,
//! so [`InboundQueue::close`] snapshots and flushes atomically with
//! respect to every push - a request arriving or re-queued during
//! shutdown is handed back to its caller for synchronous drain
//! completion instead of being lost.

use super::request::PollRequest;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Why a push was refused.
#[derive(Debug)]
pub(crate) enum RejectedPush {
    /// The queue has been closed by `stop()`; the caller must drain the
    /// request itself.
    Closed(PollRequest),
    /// A bounded queue is at capacity; the caller must complete the
    /// request immediately.
    AtCapacity(PollRequest),
}

struct State {
    items: VecDeque<PollRequest>,
    open: bool,
}

/// Thread-safe FIFO of pending requests.
pub(crate) struct InboundQueue {
    state: Mutex<State>,
    available: Condvar,
    capacity: Option<usize>,
}

impl InboundQueue {
    /// Creates an open queue with the given capacity bound.
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                open: true,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends a producer request, waking the watcher.
    ///
    /// Returns the queue depth after the push. Never blocks.
    pub(crate) fn push(&self, request: PollRequest) -> Result<usize, RejectedPush> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(RejectedPush::Closed(request));
        }
        if let Some(limit) = self.capacity {
            if state.items.len() >= limit {
                return Err(RejectedPush::AtCapacity(request));
            }
        }
        state.items.push_back(request);
        let depth = state.items.len();
        drop(state);
        self.available.notify_one();
        Ok(depth)
    }

    /// Appends a re-queued request, bypassing the capacity bound.
    ///
    /// A request already in the system must be allowed back in; only a
    /// closed queue refuses it.
    pub(crate) fn requeue(&self, request: PollRequest) -> Result<usize, PollRequest> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(request);
        }
        state.items.push_back(request);
        let depth = state.items.len();
        drop(state);
        self.available.notify_one();
        Ok(depth)
    }

    /// Blocks until the queue is non-empty or closed.
    ///
    /// Returns `true` when items are available, `false` once the queue
    /// has been closed (close flushes the items, so closed implies
    /// empty).
    pub(crate) fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        while state.open && state.items.is_empty() {
            self.available.wait(&mut state);
        }
        state.open
    }

    /// Removes and returns every queued request in one lock
    /// acquisition.
    pub(crate) fn drain(&self) -> Vec<PollRequest> {
        self.state.lock().items.drain(..).collect()
    }

    /// Closes the queue and returns the flushed snapshot.
    ///
    /// Flips `open` and drains under a single lock acquisition, then
    /// wakes every waiter. Subsequent pushes are refused with
    /// `RejectedPush::Closed`. Idempotent: a second close returns an
    /// empty snapshot.
    pub(crate) fn close(&self) -> Vec<PollRequest> {
        let mut state = self.state.lock();
        state.open = false;
        let flushed: Vec<PollRequest> = state.items.drain(..).collect();
        drop(state);
        self.available.notify_all();
        flushed
    }

    /// Returns the current queue depth.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true while the queue accepts pushes.
    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::request::{RequestId, SubjectId};
    use crate::service::{PollService, PollServiceError};
    use crate::transport::{Framing, ProtocolVersion, ResponseTransport};
    use std::io;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct IdleService;

    impl PollService for IdleService {
        fn has_events(&self, _id: RequestId, _subject: &SubjectId) -> Result<bool, PollServiceError> {
            Ok(false)
        }

        fn get_events(
            &self,
            _id: RequestId,
            _subject: &SubjectId,
            _body: &[u8],
        ) -> Result<Vec<u8>, PollServiceError> {
            Ok(Vec::new())
        }

        fn no_events(&self, _id: RequestId, _subject: &SubjectId) -> Result<Vec<u8>, PollServiceError> {
            Ok(Vec::new())
        }
    }

    struct SinkTransport;

    impl ResponseTransport for SinkTransport {
        fn deliver(&mut self, _payload: &[u8], _framing: Framing) -> io::Result<()> {
            Ok(())
        }
    }

    fn request() -> PollRequest {
        PollRequest::new(
            SubjectId::new("s"),
            Vec::new(),
            ProtocolVersion::Http11,
            Arc::new(IdleService),
            SinkTransport,
        )
    }

    #[test]
    fn test_push_and_drain_preserve_fifo_order() {
        let queue = InboundQueue::new(None);

        let first = request();
        let second = request();
        let first_id = first.id();
        let second_id = second.id();

        queue.push(first).unwrap();
        queue.push(second).unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id(), first_id);
        assert_eq!(drained[1].id(), second_id);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_push_reports_depth() {
        let queue = InboundQueue::new(None);

        assert_eq!(queue.push(request()).unwrap(), 1);
        assert_eq!(queue.push(request()).unwrap(), 2);
    }

    #[test]
    fn test_bounded_queue_rejects_at_capacity() {
        let queue = InboundQueue::new(Some(1));

        queue.push(request()).unwrap();
        match queue.push(request()) {
            Err(RejectedPush::AtCapacity(_)) => {}
            other => panic!("expected AtCapacity, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_requeue_bypasses_capacity() {
        let queue = InboundQueue::new(Some(1));

        queue.push(request()).unwrap();
        // A re-queued request must be let back in even at capacity.
        assert!(queue.requeue(request()).is_ok());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_close_flushes_snapshot() {
        let queue = InboundQueue::new(None);

        queue.push(request()).unwrap();
        queue.push(request()).unwrap();

        let flushed = queue.close();
        assert_eq!(flushed.len(), 2);
        assert_eq!(queue.len(), 0);
        assert!(!queue.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = InboundQueue::new(None);
        queue.push(request()).unwrap();

        assert_eq!(queue.close().len(), 1);
        assert_eq!(queue.close().len(), 0);
    }

    #[test]
    fn test_push_after_close_returns_request() {
        let queue = InboundQueue::new(None);
        queue.close();

        match queue.push(request()) {
            Err(RejectedPush::Closed(_)) => {}
            other => panic!("expected Closed, got {:?}", other.map(|_| ())),
        }
        assert!(queue.requeue(request()).is_err());
    }

    #[test]
    fn test_wait_for_work_wakes_on_push() {
        let queue = Arc::new(InboundQueue::new(None));
        let waiter = Arc::clone(&queue);

        let handle = thread::spawn(move || waiter.wait_for_work());

        thread::sleep(Duration::from_millis(20));
        queue.push(request()).unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_for_work_wakes_on_close() {
        let queue = Arc::new(InboundQueue::new(None));
        let waiter = Arc::clone(&queue);

        let handle = thread::spawn(move || waiter.wait_for_work());

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(!handle.join().unwrap());
    }
}
