//! Poll service collaborator contract.
//!
//! The scheduler does not know what content a long-poll endpoint serves.
//! That knowledge lives behind [`PollService`]: the pluggable component
//! that answers readiness checks and produces payloads for one category
//! of long-poll endpoint. The scheduler consumes this trait; it never
//! implements it.
//!
//! # Contract
//!
//! - [`PollService::has_events`] must return quickly. The scheduler has
//!   no timeout guard around the call itself - a slow collaborator
//!   stalls the worker evaluating the request.
//! - [`PollService::get_events`] is called only after `has_events`
//!   returned `true` for the same request.
//! - [`PollService::no_events`] produces the "no data, try later"
//!   payload used on timeout and on forced shutdown drain.

use crate::scheduler::{RequestId, SubjectId};
use std::error::Error as StdError;
use thiserror::Error;

/// Domain-side answer logic for one category of long-poll endpoint.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: a service is shared between
/// worker threads and may be queried for many requests concurrently.
pub trait PollService: Send + Sync {
    /// Non-blocking readiness check for one pending request.
    fn has_events(&self, id: RequestId, subject: &SubjectId) -> Result<bool, PollServiceError>;

    /// Produces the success payload for a ready request.
    ///
    /// `body` is the raw body of the original HTTP call, carried
    /// unmodified on the request since arrival.
    fn get_events(
        &self,
        id: RequestId,
        subject: &SubjectId,
        body: &[u8],
    ) -> Result<Vec<u8>, PollServiceError>;

    /// Produces the empty "no events" payload.
    ///
    /// Called when a request times out, when the scheduler drains its
    /// queue during shutdown, and when a bounded inbound queue rejects
    /// a new request.
    fn no_events(&self, id: RequestId, subject: &SubjectId) -> Result<Vec<u8>, PollServiceError>;
}

/// Failure raised by a [`PollService`] call.
///
/// The scheduler treats these as recoverable per-request: the failure is
/// logged and the request abandoned (or retried, depending on the
/// configured failure policy). It never tears down a worker.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PollServiceError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl PollServiceError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
