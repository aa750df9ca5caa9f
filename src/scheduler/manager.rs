//! Request manager - pool lifecycle, distribution and shutdown.
//!
//! The [`RequestManager`] owns the global inbound queue, a fixed pool of
//! worker threads and a single watcher thread. The watcher blocks while
//! the queue is empty, and per pass drains the whole queue under one
//! lock acquisition and deals it out round-robin across the workers -
//! one lock services a whole batch rather than one item at a time.
//!
//! Shutdown is cooperative: `stop()` closes the queue under the same
//! lock used by `enqueue`, force-completes everything it flushed on the
//! calling thread, and joins the threads against a drain deadline. No
//! request is ever silently dropped - it is always in a queue, being
//! evaluated, or completed.

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::queue::{InboundQueue, RejectedPush};
use super::request::{CompletionKind, PollRequest};
use super::telemetry::{SchedulerEvent, TelemetrySink, TracingTelemetrySink};
use super::worker::PollWorker;
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Interval between `is_finished` checks while joining workers against
/// the drain deadline.
const JOIN_POLL_INTERVAL_MS: u64 = 10;

// =============================================================================
// Request Manager
// =============================================================================

/// Accepts pending long-poll requests and guarantees each a single
/// terminal response.
///
/// A manager is single-use: `start()` once, `stop()` once. `stop()` is
/// also invoked on drop, so letting a started manager fall out of scope
/// still drains every buffered request.
pub struct RequestManager {
    config: SchedulerConfig,

    /// Global inbound queue, shared with workers for re-queueing.
    queue: Arc<InboundQueue>,

    /// Cooperative stop flag, checked by workers at each loop boundary.
    stopping: Arc<AtomicBool>,

    /// Latches true on the first `start()`.
    started: AtomicBool,

    /// Event sink.
    telemetry: Arc<dyn TelemetrySink>,

    /// Watcher and worker handles, present while running.
    threads: Mutex<Option<SchedulerThreads>>,
}

struct SchedulerThreads {
    watcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl RequestManager {
    /// Creates a manager with the given configuration.
    ///
    /// Uses a default [`TracingTelemetrySink`] for logging.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_telemetry(config, Arc::new(TracingTelemetrySink))
    }

    /// Creates a manager with a custom telemetry sink.
    pub fn with_telemetry(config: SchedulerConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        let queue = Arc::new(InboundQueue::new(config.queue_capacity.limit()));
        Self {
            config,
            queue,
            stopping: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            telemetry,
            threads: Mutex::new(None),
        }
    }

    /// Starts the worker pool and the watcher thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] for a zero worker
    /// count, and [`SchedulerError::AlreadyStarted`] if the manager has
    /// started before (including after a `stop()`).
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.config.worker_count == 0 {
            return Err(SchedulerError::InvalidWorkerCount(0));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let mut senders = Vec::with_capacity(self.config.worker_count);
        let mut workers = Vec::with_capacity(self.config.worker_count);

        for index in 0..self.config.worker_count {
            let (inbox_tx, inbox_rx) = unbounded();
            let worker = PollWorker::new(
                index,
                inbox_rx,
                Arc::clone(&self.queue),
                self.config.poll_timeout,
                self.config.failure_policy,
                Arc::clone(&self.stopping),
                Arc::clone(&self.telemetry),
            );

            let handle = thread::Builder::new()
                .name(format!("poll-worker-{index}"))
                .spawn(move || worker.run())
                .expect("Failed to spawn poll worker thread");

            senders.push(inbox_tx);
            workers.push(handle);
        }

        let watcher = Watcher {
            queue: Arc::clone(&self.queue),
            senders,
            interval: self.config.watch_interval,
            telemetry: Arc::clone(&self.telemetry),
        };
        let watcher_handle = thread::Builder::new()
            .name("poll-watcher".to_string())
            .spawn(move || watcher.run())
            .expect("Failed to spawn poll watcher thread");

        *self.threads.lock() = Some(SchedulerThreads {
            watcher: watcher_handle,
            workers,
        });

        info!(
            workers = self.config.worker_count,
            poll_timeout_ms = self.config.poll_timeout.as_millis(),
            "Poll scheduler started"
        );
        self.telemetry.emit(SchedulerEvent::SchedulerStarted {
            workers: self.config.worker_count,
        });

        Ok(())
    }

    /// Appends a request to the inbound queue, waking the watcher.
    ///
    /// Never blocks and never loses the request: after `stop()` the
    /// request is drained synchronously on the calling thread, and a
    /// bounded queue at capacity rejects it with an immediate empty
    /// completion.
    pub fn enqueue(&self, request: PollRequest) {
        let id = request.id();
        match self.queue.push(request) {
            Ok(depth) => {
                self.telemetry.emit(SchedulerEvent::RequestEnqueued {
                    id,
                    queue_depth: depth,
                });
            }
            Err(RejectedPush::Closed(request)) => {
                debug!(request_id = %id, "Enqueue after stop; draining synchronously");
                request.complete_empty(CompletionKind::Drained, &*self.telemetry);
            }
            Err(RejectedPush::AtCapacity(request)) => {
                let depth = self.queue.len();
                warn!(
                    request_id = %id,
                    queue_depth = depth,
                    "Inbound queue at capacity; completing with empty payload"
                );
                self.telemetry.emit(SchedulerEvent::RequestRejected {
                    id,
                    queue_depth: depth,
                });
                request.complete_empty(CompletionKind::Empty, &*self.telemetry);
            }
        }
    }

    /// Stops the scheduler, draining every buffered request.
    ///
    /// Closes the queue under the enqueue lock (no request can slip
    /// between the snapshot and the flush), completes the snapshot with
    /// empty payloads on the calling thread, then joins the watcher and
    /// bounded-joins each worker. When this returns the queue is empty
    /// and every buffered request has received its response.
    ///
    /// Idempotent; also safe to call before `start()`.
    pub fn stop(&self) {
        let first_stop = !self.stopping.swap(true, Ordering::AcqRel);

        let flushed = self.queue.close();
        let drained = flushed.len();
        if drained > 0 {
            info!(drained = drained, "Draining inbound queue");
        }
        for request in flushed {
            request.complete_empty(CompletionKind::Drained, &*self.telemetry);
        }

        let threads = self.threads.lock().take();
        if let Some(SchedulerThreads { watcher, workers }) = threads {
            if let Err(e) = watcher.join() {
                warn!("Poll watcher thread panicked: {:?}", e);
            }

            let deadline = Instant::now() + self.config.drain_timeout;
            for (index, handle) in workers.into_iter().enumerate() {
                join_worker(index, handle, deadline);
            }
        }

        if first_stop {
            info!(drained = drained, "Poll scheduler stopped");
            self.telemetry
                .emit(SchedulerEvent::SchedulerStopped { drained });
        }
    }

    /// Returns true once `start()` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the current inbound queue depth.
    ///
    /// Requests held in worker inboxes or mid-evaluation are not
    /// counted.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for RequestManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("workers", &self.config.worker_count)
            .field("started", &self.is_started())
            .field("accepting", &self.queue.is_open())
            .field("queue_depth", &self.queue_depth())
            .finish_non_exhaustive()
    }
}

/// Joins one worker against the shared drain deadline, detaching it
/// with a warning if it fails to finish in time.
fn join_worker(index: usize, handle: JoinHandle<()>, deadline: Instant) {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(JOIN_POLL_INTERVAL_MS));
    }

    if handle.is_finished() {
        if let Err(e) = handle.join() {
            warn!(worker = index, "Poll worker thread panicked: {:?}", e);
        }
    } else {
        warn!(
            worker = index,
            "Poll worker did not drain within deadline; detaching"
        );
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// The watcher loop: batch the inbound queue and deal it out.
struct Watcher {
    queue: Arc<InboundQueue>,
    senders: Vec<Sender<PollRequest>>,
    interval: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Watcher {
    /// Runs until the queue is closed.
    ///
    /// Exiting drops the inbox senders, which is what lets each worker
    /// finish draining and stop.
    fn run(self) {
        debug!("Poll watcher started");

        let mut first_worker = 0usize;
        while self.queue.wait_for_work() {
            let batch = self.queue.drain();
            if batch.is_empty() {
                continue;
            }
            first_worker = self.distribute(batch, first_worker);

            // Pace the next pass so re-queued requests are not spun
            // through evaluation back-to-back.
            thread::sleep(self.interval);
        }

        debug!("Poll watcher stopped");
    }

    /// Deals a batch round-robin across the worker inboxes.
    ///
    /// Each worker receives up to `ceil(batch / workers)` consecutive
    /// requests. The starting worker advances between passes so
    /// successive small batches do not always land on worker 0. Returns
    /// the starting worker for the next pass.
    fn distribute(&self, batch: Vec<PollRequest>, first_worker: usize) -> usize {
        let per_worker = batch.len().div_ceil(self.senders.len());
        self.telemetry.emit(SchedulerEvent::BatchDistributed {
            batch_size: batch.len(),
            per_worker,
        });

        let mut worker = first_worker % self.senders.len();
        let mut dealt = 0usize;
        for request in batch {
            if dealt == per_worker {
                worker = (worker + 1) % self.senders.len();
                dealt = 0;
            }
            match self.senders[worker].send(request) {
                Ok(()) => dealt += 1,
                Err(send_error) => {
                    // A disconnected inbox means the worker died; the
                    // request still gets its terminal response.
                    error!(worker = worker, "Worker inbox disconnected; draining request");
                    send_error
                        .into_inner()
                        .complete_empty(CompletionKind::Drained, &*self.telemetry);
                }
            }
        }

        (worker + 1) % self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::config::{FailurePolicy, QueueCapacity};
    use crate::scheduler::request::{RequestId, SubjectId};
    use crate::scheduler::telemetry::NullTelemetrySink;
    use crate::service::{PollService, PollServiceError};
    use crate::transport::{Framing, ProtocolVersion, ResponseTransport};
    use std::io;
    use std::sync::atomic::AtomicUsize;

    /// Collaborator that is ready for a configurable set of subjects.
    struct TestService {
        ready_subject: Option<String>,
    }

    impl TestService {
        fn never_ready() -> Arc<Self> {
            Arc::new(Self {
                ready_subject: None,
            })
        }

        fn ready_for(subject: &str) -> Arc<Self> {
            Arc::new(Self {
                ready_subject: Some(subject.to_string()),
            })
        }
    }

    impl PollService for TestService {
        fn has_events(&self, _id: RequestId, subject: &SubjectId) -> Result<bool, PollServiceError> {
            Ok(self.ready_subject.as_deref() == Some(subject.as_str()))
        }

        fn get_events(
            &self,
            _id: RequestId,
            _subject: &SubjectId,
            _body: &[u8],
        ) -> Result<Vec<u8>, PollServiceError> {
            Ok(b"data".to_vec())
        }

        fn no_events(&self, _id: RequestId, _subject: &SubjectId) -> Result<Vec<u8>, PollServiceError> {
            Ok(b"empty".to_vec())
        }
    }

    /// Transport that counts deliveries and records payloads.
    struct CountingTransport {
        payloads: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
        deliveries: Arc<AtomicUsize>,
    }

    impl ResponseTransport for CountingTransport {
        fn deliver(&mut self, payload: &[u8], _framing: Framing) -> io::Result<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            self.payloads.lock().push(payload.to_vec());
            Ok(())
        }
    }

    struct Harness {
        payloads: Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
        deliveries: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                payloads: Arc::new(parking_lot::Mutex::new(Vec::new())),
                deliveries: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn request(&self, subject: &str, service: Arc<dyn PollService>) -> PollRequest {
            PollRequest::new(
                SubjectId::new(subject),
                Vec::new(),
                ProtocolVersion::Http11,
                service,
                CountingTransport {
                    payloads: Arc::clone(&self.payloads),
                    deliveries: Arc::clone(&self.deliveries),
                },
            )
        }

        fn deliveries(&self) -> usize {
            self.deliveries.load(Ordering::SeqCst)
        }
    }

    fn quick_config(workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            worker_count: workers,
            poll_timeout: Duration::from_millis(100),
            watch_interval: Duration::from_millis(5),
            queue_capacity: QueueCapacity::Unbounded,
            failure_policy: FailurePolicy::Abandon,
            drain_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_start_twice_errors() {
        let manager =
            RequestManager::with_telemetry(quick_config(1), Arc::new(NullTelemetrySink));

        manager.start().unwrap();
        assert!(matches!(
            manager.start(),
            Err(SchedulerError::AlreadyStarted)
        ));

        manager.stop();
    }

    #[test]
    fn test_start_rejects_zero_workers() {
        let manager =
            RequestManager::with_telemetry(quick_config(0), Arc::new(NullTelemetrySink));

        assert!(matches!(
            manager.start(),
            Err(SchedulerError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn test_ready_request_completes_with_data() {
        let harness = Harness::new();
        let manager =
            RequestManager::with_telemetry(quick_config(2), Arc::new(NullTelemetrySink));
        manager.start().unwrap();

        manager.enqueue(harness.request("agent-1", TestService::ready_for("agent-1")));

        // One watcher pass plus worker evaluation is plenty inside 500ms.
        let deadline = Instant::now() + Duration::from_millis(500);
        while harness.deliveries() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(harness.deliveries(), 1);
        assert_eq!(harness.payloads.lock()[0], b"data");

        manager.stop();
    }

    #[test]
    fn test_stop_without_start_drains_queue() {
        let harness = Harness::new();
        let manager =
            RequestManager::with_telemetry(quick_config(2), Arc::new(NullTelemetrySink));

        manager.enqueue(harness.request("a", TestService::never_ready()));
        manager.enqueue(harness.request("b", TestService::never_ready()));
        assert_eq!(manager.queue_depth(), 2);

        manager.stop();

        assert_eq!(manager.queue_depth(), 0);
        assert_eq!(harness.deliveries(), 2);
        for payload in harness.payloads.lock().iter() {
            assert_eq!(payload, b"empty");
        }
    }

    #[test]
    fn test_enqueue_after_stop_drains_synchronously() {
        let harness = Harness::new();
        let manager =
            RequestManager::with_telemetry(quick_config(1), Arc::new(NullTelemetrySink));
        manager.stop();

        manager.enqueue(harness.request("late", TestService::never_ready()));

        // Completed inline on this thread, not buffered.
        assert_eq!(harness.deliveries(), 1);
        assert_eq!(manager.queue_depth(), 0);
    }

    #[test]
    fn test_bounded_capacity_rejects_with_empty_payload() {
        let harness = Harness::new();
        let mut config = quick_config(1);
        config.queue_capacity = QueueCapacity::Bounded(1);
        let manager = RequestManager::with_telemetry(config, Arc::new(NullTelemetrySink));
        // Not started: pushes buffer up and the second must bounce.

        manager.enqueue(harness.request("a", TestService::never_ready()));
        manager.enqueue(harness.request("b", TestService::never_ready()));

        assert_eq!(manager.queue_depth(), 1);
        assert_eq!(harness.deliveries(), 1);
        assert_eq!(harness.payloads.lock()[0], b"empty");

        manager.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let manager =
            RequestManager::with_telemetry(quick_config(1), Arc::new(NullTelemetrySink));
        manager.start().unwrap();

        manager.stop();
        manager.stop();

        assert!(manager.is_started());
        assert_eq!(manager.queue_depth(), 0);
    }

    #[test]
    fn test_drop_stops_scheduler() {
        let harness = Harness::new();
        {
            let manager =
                RequestManager::with_telemetry(quick_config(1), Arc::new(NullTelemetrySink));
            manager.enqueue(harness.request("a", TestService::never_ready()));
            // Dropped without an explicit stop.
        }

        assert_eq!(harness.deliveries(), 1);
    }
}
