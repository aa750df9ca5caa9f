//! Scheduler configuration.
//!
//! This module contains the [`SchedulerConfig`] struct and related
//! constants. Configuration is immutable for the lifetime of a
//! [`RequestManager`](super::RequestManager).

use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default number of worker threads.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default per-request poll timeout in milliseconds.
///
/// A request whose collaborator never reports readiness is forced to
/// complete with the empty payload once this much time has passed since
/// arrival.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;

/// Default watcher pacing interval in milliseconds.
///
/// The watcher sleeps this long between distribution passes, which
/// bounds how often a not-yet-ready request is re-evaluated. A request
/// can overshoot its timeout by up to one pacing interval plus its
/// position in a worker queue.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 25;

/// Default drain deadline in milliseconds for joining worker threads
/// during shutdown.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// Queue Capacity
// =============================================================================

/// Capacity policy for the global inbound queue.
///
/// The original design deliberately accepts every poll request, trading
/// bounded memory for never rejecting a client. `Bounded` is the opt-in
/// mitigation for client storms: over-capacity requests are completed
/// immediately with the empty payload rather than buffered.
///
/// The bound applies to producer pushes only. Re-queued requests bypass
/// it, so a request already in the system can never be forced to
/// complete before its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    /// Accept every request (original behavior).
    Unbounded,
    /// Reject new requests once this many are buffered.
    Bounded(usize),
}

impl QueueCapacity {
    /// Returns the capacity limit, or `None` when unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            QueueCapacity::Unbounded => None,
            QueueCapacity::Bounded(limit) => Some(limit),
        }
    }
}

// =============================================================================
// Failure Policy
// =============================================================================

/// What a worker does with a request whose collaborator call failed.
///
/// The original system abandons such requests immediately; a bounded
/// retry gives transient collaborator failures a second chance while
/// still preventing a poison request from looping forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and abandon on the first collaborator failure (original
    /// behavior).
    Abandon,
    /// Re-queue and retry up to `max_attempts` failed evaluations, then
    /// abandon.
    Retry { max_attempts: u32 },
}

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Configuration for the request scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. Must be at least 1.
    pub worker_count: usize,

    /// Per-request poll timeout, measured from original arrival.
    pub poll_timeout: Duration,

    /// Watcher pacing interval between distribution passes.
    pub watch_interval: Duration,

    /// Inbound queue capacity policy.
    pub queue_capacity: QueueCapacity,

    /// Collaborator failure policy.
    pub failure_policy: FailurePolicy,

    /// How long `stop()` waits for each worker thread to finish
    /// draining before detaching it.
    pub drain_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            watch_interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            queue_capacity: QueueCapacity::Unbounded,
            failure_policy: FailurePolicy::Abandon,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}
