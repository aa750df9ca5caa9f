//! Long-Poll Request Scheduler
//!
//! This module buffers pending long-poll calls, fans them out to a small
//! pool of worker threads, and guarantees every request a single
//! terminal response - with data, with an empty payload on timeout, or
//! with an empty payload when shutdown drains the queue.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        RequestManager                          │
//! │                                                                │
//! │  enqueue() ──► ┌───────────────┐       ┌───────────────────┐   │
//! │                │ InboundQueue  │──────►│   Watcher thread  │   │
//! │        ┌──────►│ (mutex+cond)  │       │  batch + deal out │   │
//! │        │       └───────────────┘       └─────────┬─────────┘   │
//! │        │                                         │             │
//! │        │                ┌────────────┬───────────┴──┐          │
//! │        │                ▼            ▼              ▼          │
//! │        │          ┌──────────┐ ┌──────────┐  ┌──────────┐      │
//! │     re-queue      │ worker 0 │ │ worker 1 │  │ worker N │      │
//! │        │          └────┬─────┘ └────┬─────┘  └────┬─────┘      │
//! │        │               │            │             │            │
//! │        └───────────────┴────────────┴─────────────┘            │
//! │                     not ready, not timed out                   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each worker evaluates one request at a time: ready requests are
//! completed with the collaborator's payload, timed-out requests with
//! its empty payload, and everything else is handed back to the inbound
//! queue for a later pass. The watcher redistributes the queue
//! round-robin per pass, so there is no global FIFO guarantee across
//! workers - acceptable for idempotent readiness polling.
//!
//! # Example
//!
//! ```ignore
//! use pollgate::scheduler::{PollRequest, RequestManager, SchedulerConfig, SubjectId};
//! use pollgate::transport::ProtocolVersion;
//! use std::sync::Arc;
//!
//! let manager = RequestManager::new(SchedulerConfig::default());
//! manager.start()?;
//!
//! let request = PollRequest::new(
//!     SubjectId::new("agent-7f3a"),
//!     body_bytes,
//!     ProtocolVersion::Http11,
//!     Arc::clone(&event_service),
//!     transport,
//! );
//! manager.enqueue(request);
//!
//! // ... later ...
//! manager.stop();
//! ```
//!
//! # Shutdown
//!
//! [`RequestManager::stop`] closes the inbound queue under the same lock
//! used by `enqueue`, completes every buffered request with the empty
//! payload on the calling thread, and joins the watcher and workers
//! cooperatively. No client is left with a hung connection.

mod config;
mod error;
mod manager;
mod queue;
mod request;
mod telemetry;
mod worker;

// Configuration
pub use config::{
    FailurePolicy, QueueCapacity, SchedulerConfig, DEFAULT_DRAIN_TIMEOUT_MS,
    DEFAULT_POLL_TIMEOUT_MS, DEFAULT_WATCH_INTERVAL_MS, DEFAULT_WORKER_COUNT,
};

// Errors
pub use error::SchedulerError;

// Request types
pub use request::{CompletionKind, PollRequest, RequestId, SubjectId};

// Manager
pub use manager::RequestManager;

// Telemetry
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, SchedulerEvent, TelemetrySink, TracingTelemetrySink,
};
