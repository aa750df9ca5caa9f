//! Pending request record and terminal completion paths.
//!
//! A [`PollRequest`] describes one outstanding long-poll call: identity,
//! arrival instant, the collaborator that knows how to answer it, and
//! the open transport the answer is written to. Exactly one record
//! exists per outstanding call, and it is consumed by value on every
//! terminal path - the type system enforces that a response is written
//! at most once.

use crate::scheduler::telemetry::{SchedulerEvent, TelemetrySink};
use crate::service::PollService;
use crate::transport::{is_connection_gone, ProtocolVersion, ResponseTransport};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Monotonic source for request identities.
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Identity Types
// =============================================================================

/// Unique identity of one pending long-poll call.
///
/// Identities are process-local and monotonic. Re-queueing never changes
/// a request's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates the next request identity.
    pub fn next() -> Self {
        Self(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value of this identity.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The collaborator's domain key for a request - which client, agent or
/// channel is being polled for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a subject ID with the given value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string value of this subject ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Completion Kind
// =============================================================================

/// How a request reached its terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// The collaborator had events; the success payload was delivered.
    Data,
    /// The poll timeout elapsed; the empty payload was delivered.
    Empty,
    /// Shutdown (or a rejecting queue) forced the empty payload.
    Drained,
}

impl fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionKind::Data => write!(f, "data"),
            CompletionKind::Empty => write!(f, "empty"),
            CompletionKind::Drained => write!(f, "drained"),
        }
    }
}

// =============================================================================
// Poll Request
// =============================================================================

/// One pending long-poll call.
///
/// Created when the accept layer hands a parsed request to the
/// scheduler; destroyed once a response has been written and the
/// transport closed, or once shutdown drains it.
pub struct PollRequest {
    /// Unique identity, fixed at arrival.
    id: RequestId,

    /// The collaborator's domain key for this request.
    subject: SubjectId,

    /// Raw body of the original HTTP call, forwarded to `get_events`.
    body: Vec<u8>,

    /// Protocol version negotiated at arrival; determines body framing.
    protocol: ProtocolVersion,

    /// Arrival instant. Timeout is measured from here, never from a
    /// re-queue.
    arrived_at: Instant,

    /// Failed collaborator evaluations so far (retry bookkeeping; not
    /// part of identity).
    failed_attempts: u32,

    /// The collaborator that knows how to answer this request.
    service: Arc<dyn PollService>,

    /// The open connection the response is written to.
    transport: Box<dyn ResponseTransport>,
}

impl PollRequest {
    /// Creates a record for a long-poll call that just arrived.
    pub fn new(
        subject: SubjectId,
        body: Vec<u8>,
        protocol: ProtocolVersion,
        service: Arc<dyn PollService>,
        transport: impl ResponseTransport + 'static,
    ) -> Self {
        Self {
            id: RequestId::next(),
            subject,
            body,
            protocol,
            arrived_at: Instant::now(),
            failed_attempts: 0,
            service,
            transport: Box::new(transport),
        }
    }

    /// Returns the unique identity of this request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the subject being polled for.
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Returns the protocol version negotiated at arrival.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Returns time elapsed since the original arrival.
    pub fn elapsed(&self) -> Duration {
        self.arrived_at.elapsed()
    }

    /// Returns the raw body of the original call.
    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the owning collaborator.
    pub(crate) fn service(&self) -> &Arc<dyn PollService> {
        &self.service
    }

    /// Records one failed collaborator evaluation, returning the total.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }

    /// Delivers `payload` and closes the transport. Terminal.
    ///
    /// A transport failure is never retried: the request is abandoned
    /// after logging. Well-known connection-gone errors are expected
    /// under client churn and logged at debug only.
    pub(crate) fn finish(
        mut self,
        payload: Vec<u8>,
        kind: CompletionKind,
        telemetry: &dyn TelemetrySink,
    ) {
        let waited = self.arrived_at.elapsed();
        let framing = self.protocol.framing();

        match self.transport.deliver(&payload, framing) {
            Ok(()) => {
                trace!(
                    request_id = %self.id,
                    subject = %self.subject,
                    kind = %kind,
                    waited_ms = waited.as_millis(),
                    bytes = payload.len(),
                    "Request completed"
                );
                telemetry.emit(SchedulerEvent::RequestCompleted {
                    id: self.id,
                    kind,
                    waited,
                });
            }
            Err(error) if is_connection_gone(&error) => {
                debug!(
                    request_id = %self.id,
                    subject = %self.subject,
                    error = %error,
                    "Client gone before delivery; abandoning"
                );
                telemetry.emit(SchedulerEvent::RequestAbandoned { id: self.id });
            }
            Err(error) => {
                warn!(
                    request_id = %self.id,
                    subject = %self.subject,
                    error = %error,
                    "Transport delivery failed; abandoning"
                );
                telemetry.emit(SchedulerEvent::RequestAbandoned { id: self.id });
            }
        }
    }

    /// Completes this request with the collaborator's empty payload.
    /// Terminal.
    ///
    /// Used on timeout, on shutdown drain and on queue rejection. Falls
    /// back to abandoning the request if the collaborator cannot even
    /// produce its empty payload.
    pub(crate) fn complete_empty(self, kind: CompletionKind, telemetry: &dyn TelemetrySink) {
        match self.service.no_events(self.id, &self.subject) {
            Ok(payload) => self.finish(payload, kind, telemetry),
            Err(error) => {
                warn!(
                    request_id = %self.id,
                    subject = %self.subject,
                    error = %error,
                    "Collaborator failed to produce empty payload; abandoning"
                );
                telemetry.emit(SchedulerEvent::RequestAbandoned { id: self.id });
            }
        }
    }

    /// Abandons this request after a collaborator failure. Terminal.
    ///
    /// Makes a best effort to still hand the client the empty payload;
    /// if that fails too the transport is simply dropped, closing the
    /// connection.
    pub(crate) fn abandon(mut self, telemetry: &dyn TelemetrySink) {
        telemetry.emit(SchedulerEvent::RequestAbandoned { id: self.id });

        if let Ok(payload) = self.service.no_events(self.id, &self.subject) {
            let framing = self.protocol.framing();
            if let Err(error) = self.transport.deliver(&payload, framing) {
                debug!(
                    request_id = %self.id,
                    error = %error,
                    "Fallback empty delivery failed; closing connection"
                );
            }
        }
    }
}

impl fmt::Debug for PollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollRequest")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("protocol", &self.protocol)
            .field("failed_attempts", &self.failed_attempts)
            .finish_non_exhaustive()
    }
}
