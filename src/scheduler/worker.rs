//! Worker evaluation loop.
//!
//! Each worker owns a private blocking inbox; the watcher is the only
//! writer. A worker pulls one request at a time and drives it through
//! the evaluation state machine:
//!
//! - collaborator reports events -> complete with the success payload;
//! - timed out -> complete with the empty payload;
//! - neither -> hand the request back to the inbound queue for a later
//!   pass (same identity, same arrival instant).
//!
//! Once the stop flag is set, remaining inbox items are drained with the
//! empty payload instead of being evaluated. The loop exits when the
//! watcher drops the inbox sender and the inbox is empty.
//!
//! A failure evaluating or completing one request never escapes the
//! loop: every per-request operation is isolated, logged, and the worker
//! moves on to the next item.

use super::config::FailurePolicy;
use super::queue::InboundQueue;
use super::request::{CompletionKind, PollRequest};
use super::telemetry::{SchedulerEvent, TelemetrySink};
use crate::service::PollServiceError;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One worker of the scheduler's pool.
pub(crate) struct PollWorker {
    /// Index within the pool, for thread naming and telemetry.
    index: usize,

    /// Private inbox; the watcher holds the only sender.
    inbox: Receiver<PollRequest>,

    /// Handle for re-queueing not-yet-ready requests.
    queue: Arc<InboundQueue>,

    /// Per-request poll timeout, measured from original arrival.
    poll_timeout: Duration,

    /// What to do with a request whose collaborator call failed.
    failure_policy: FailurePolicy,

    /// Set by `stop()`; switches the loop into drain mode.
    stopping: Arc<AtomicBool>,

    /// Event sink.
    telemetry: Arc<dyn TelemetrySink>,
}

impl PollWorker {
    pub(crate) fn new(
        index: usize,
        inbox: Receiver<PollRequest>,
        queue: Arc<InboundQueue>,
        poll_timeout: Duration,
        failure_policy: FailurePolicy,
        stopping: Arc<AtomicBool>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            index,
            inbox,
            queue,
            poll_timeout,
            failure_policy,
            stopping,
            telemetry,
        }
    }

    /// Runs the evaluation loop until the inbox disconnects.
    pub(crate) fn run(self) {
        debug!(worker = self.index, "Poll worker started");
        self.telemetry
            .emit(SchedulerEvent::WorkerStarted { worker: self.index });

        while let Ok(request) = self.inbox.recv() {
            if self.stopping.load(Ordering::Acquire) {
                // Drain mode: shutdown already promised these requests
                // an empty completion.
                request.complete_empty(CompletionKind::Drained, &*self.telemetry);
                continue;
            }
            self.evaluate(request);
        }

        debug!(worker = self.index, "Poll worker stopped");
        self.telemetry
            .emit(SchedulerEvent::WorkerStopped { worker: self.index });
    }

    /// Drives one request to completion or back to the inbound queue.
    fn evaluate(&self, request: PollRequest) {
        match request.service().has_events(request.id(), request.subject()) {
            Ok(true) => self.complete_ready(request),
            Ok(false) => {
                if request.elapsed() >= self.poll_timeout {
                    request.complete_empty(CompletionKind::Empty, &*self.telemetry);
                } else {
                    self.requeue(request);
                }
            }
            Err(error) => self.handle_collaborator_failure(request, error),
        }
    }

    /// Completes a ready request with the collaborator's payload.
    fn complete_ready(&self, request: PollRequest) {
        let outcome =
            request
                .service()
                .get_events(request.id(), request.subject(), request.body());

        match outcome {
            Ok(payload) => request.finish(payload, CompletionKind::Data, &*self.telemetry),
            Err(error) => self.handle_collaborator_failure(request, error),
        }
    }

    /// Hands a not-yet-ready request back to the inbound queue.
    fn requeue(&self, request: PollRequest) {
        let id = request.id();
        match self.queue.requeue(request) {
            Ok(_) => {
                self.telemetry.emit(SchedulerEvent::RequestRequeued { id });
            }
            // Queue closed mid-flight: shutdown owns this request now.
            Err(request) => request.complete_empty(CompletionKind::Drained, &*self.telemetry),
        }
    }

    /// Applies the configured failure policy after a collaborator error.
    fn handle_collaborator_failure(&self, mut request: PollRequest, error: PollServiceError) {
        match self.failure_policy {
            FailurePolicy::Retry { max_attempts } => {
                let attempt = request.record_failure();
                if attempt < max_attempts {
                    warn!(
                        request_id = %request.id(),
                        subject = %request.subject(),
                        attempt = attempt,
                        error = %error,
                        "Collaborator call failed; re-queueing for retry"
                    );
                    self.requeue(request);
                } else {
                    warn!(
                        request_id = %request.id(),
                        subject = %request.subject(),
                        attempts = attempt,
                        error = %error,
                        "Collaborator call failed on final attempt; abandoning"
                    );
                    request.abandon(&*self.telemetry);
                }
            }
            FailurePolicy::Abandon => {
                warn!(
                    request_id = %request.id(),
                    subject = %request.subject(),
                    error = %error,
                    "Collaborator call failed; abandoning"
                );
                request.abandon(&*self.telemetry);
            }
        }
    }
}
