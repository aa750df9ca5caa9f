//! Telemetry for scheduler observability.
//!
//! The scheduler emits structured events via a sink abstraction and does
//! not know how they are consumed - the "emit, don't present" pattern.
//! Consumers (logging, metrics, test probes) decide how to present or
//! aggregate events.
//!
//! # Example
//!
//! ```ignore
//! use pollgate::scheduler::{SchedulerEvent, TelemetrySink};
//!
//! struct LoggingSink;
//!
//! impl TelemetrySink for LoggingSink {
//!     fn emit(&self, event: SchedulerEvent) {
//!         tracing::info!(?event, "Scheduler event");
//!     }
//! }
//! ```

use super::request::{CompletionKind, RequestId};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Scheduler Events
// =============================================================================

/// Events emitted as requests travel through the scheduler.
#[derive(Clone, Debug)]
pub enum SchedulerEvent {
    /// The scheduler started its watcher and worker threads.
    SchedulerStarted { workers: usize },

    /// The scheduler stopped; `drained` requests were force-completed.
    SchedulerStopped { drained: usize },

    /// A request entered the inbound queue.
    RequestEnqueued {
        id: RequestId,
        queue_depth: usize,
    },

    /// A bounded inbound queue rejected a request.
    RequestRejected {
        id: RequestId,
        queue_depth: usize,
    },

    /// The watcher dealt one batch out to the workers.
    BatchDistributed {
        batch_size: usize,
        per_worker: usize,
    },

    /// A not-yet-ready request went back to the inbound queue.
    RequestRequeued { id: RequestId },

    /// A request reached a terminal response.
    RequestCompleted {
        id: RequestId,
        kind: CompletionKind,
        waited: Duration,
    },

    /// A request was abandoned after a collaborator or transport
    /// failure.
    RequestAbandoned { id: RequestId },

    /// A worker thread entered its evaluation loop.
    WorkerStarted { worker: usize },

    /// A worker thread drained its queue and exited.
    WorkerStopped { worker: usize },
}

impl SchedulerEvent {
    /// Returns the request ID associated with this event, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::RequestEnqueued { id, .. }
            | Self::RequestRejected { id, .. }
            | Self::RequestRequeued { id }
            | Self::RequestCompleted { id, .. }
            | Self::RequestAbandoned { id } => Some(*id),
            Self::SchedulerStarted { .. }
            | Self::SchedulerStopped { .. }
            | Self::BatchDistributed { .. }
            | Self::WorkerStarted { .. }
            | Self::WorkerStopped { .. } => None,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SchedulerStarted { .. } => "scheduler_started",
            Self::SchedulerStopped { .. } => "scheduler_stopped",
            Self::RequestEnqueued { .. } => "request_enqueued",
            Self::RequestRejected { .. } => "request_rejected",
            Self::BatchDistributed { .. } => "batch_distributed",
            Self::RequestRequeued { .. } => "request_requeued",
            Self::RequestCompleted { .. } => "request_completed",
            Self::RequestAbandoned { .. } => "request_abandoned",
            Self::WorkerStarted { .. } => "worker_started",
            Self::WorkerStopped { .. } => "worker_stopped",
        }
    }
}

// =============================================================================
// Telemetry Sink Trait
// =============================================================================

/// Sink for scheduler events.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`): events are
/// emitted from the watcher, every worker, and whatever thread calls
/// `enqueue` or `stop`.
pub trait TelemetrySink: Send + Sync {
    /// Called when a scheduler event occurs.
    ///
    /// This method should be fast and non-blocking; it runs on the hot
    /// path of request evaluation.
    fn emit(&self, event: SchedulerEvent);
}

// =============================================================================
// Built-in Sink Implementations
// =============================================================================

/// No-op sink for when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: SchedulerEvent) {
        // Intentionally empty
    }
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: SchedulerEvent) {
        match &event {
            SchedulerEvent::SchedulerStarted { workers } => {
                tracing::info!(workers = workers, "Scheduler started");
            }
            SchedulerEvent::SchedulerStopped { drained } => {
                tracing::info!(drained = drained, "Scheduler stopped");
            }
            SchedulerEvent::RequestEnqueued { id, queue_depth } => {
                tracing::trace!(
                    request_id = %id,
                    queue_depth = queue_depth,
                    "Request enqueued"
                );
            }
            SchedulerEvent::RequestRejected { id, queue_depth } => {
                tracing::warn!(
                    request_id = %id,
                    queue_depth = queue_depth,
                    "Request rejected at capacity"
                );
            }
            SchedulerEvent::BatchDistributed {
                batch_size,
                per_worker,
            } => {
                tracing::trace!(
                    batch_size = batch_size,
                    per_worker = per_worker,
                    "Batch distributed"
                );
            }
            SchedulerEvent::RequestRequeued { id } => {
                tracing::trace!(request_id = %id, "Request re-queued");
            }
            SchedulerEvent::RequestCompleted { id, kind, waited } => {
                tracing::debug!(
                    request_id = %id,
                    kind = %kind,
                    waited_ms = waited.as_millis(),
                    "Request completed"
                );
            }
            SchedulerEvent::RequestAbandoned { id } => {
                tracing::debug!(request_id = %id, "Request abandoned");
            }
            SchedulerEvent::WorkerStarted { worker } => {
                tracing::debug!(worker = worker, "Worker started");
            }
            SchedulerEvent::WorkerStopped { worker } => {
                tracing::debug!(worker = worker, "Worker stopped");
            }
        }
    }
}

/// Sink that forwards events to multiple sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    /// Creates a new multiplex sink with the given sinks.
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink to the multiplex.
    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: SchedulerEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexTelemetrySink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}
