//! Response transport abstraction.
//!
//! The HTTP accept layer owns connection handling; the scheduler only
//! ever performs one operation per connection - write the response body
//! and close. [`ResponseTransport`] captures that single write-and-close
//! operation, and [`Framing`] captures how the body bytes are framed on
//! the wire.
//!
//! Framing is negotiated once, when the original request arrives, from
//! the protocol version of the call (HTTP/1.0 clients cannot consume
//! chunked bodies) and carried on the request from then on. Status line
//! and headers are written by the accept layer before the transport
//! handle is surrendered to the scheduler; only the body passes through
//! here.

use std::io::{self, Write};
use tracing::trace;

// =============================================================================
// Protocol Version and Framing
// =============================================================================

/// Protocol version of the original long-poll call.
///
/// Determined once at request-arrival time and carried on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// HTTP/1.0 - body is written verbatim, connection close delimits it.
    Http10,
    /// HTTP/1.1 - body is written with chunked transfer framing.
    Http11,
}

impl ProtocolVersion {
    /// Returns the body framing negotiated for this protocol version.
    pub fn framing(self) -> Framing {
        match self {
            ProtocolVersion::Http10 => Framing::Identity,
            ProtocolVersion::Http11 => Framing::Chunked,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::Http10 => write!(f, "HTTP/1.0"),
            ProtocolVersion::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

/// On-the-wire framing for a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Raw bytes, delimited by connection close.
    Identity,
    /// Chunked transfer encoding: one data chunk plus the terminator.
    Chunked,
}

// =============================================================================
// Response Transport
// =============================================================================

/// The open connection/response sink carried on a pending request.
///
/// A transport is consumed by exactly one delivery. Dropping an
/// undelivered transport closes the underlying connection without a
/// payload - the abandon path for requests that cannot be serviced.
///
/// # Thread Safety
///
/// Transports move between threads as their request travels through the
/// pipeline, so implementations must be `Send`.
pub trait ResponseTransport: Send {
    /// Writes the response body with the given framing and closes the
    /// connection.
    fn deliver(&mut self, payload: &[u8], framing: Framing) -> io::Result<()>;
}

/// Returns true for error kinds that mean the client is simply gone.
///
/// These are expected under normal client churn and are suppressed from
/// warn-level logging.
pub fn is_connection_gone(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

// =============================================================================
// Write-backed Transport
// =============================================================================

/// Stock [`ResponseTransport`] over any [`Write`] sink.
///
/// Suitable for `TcpStream` and friends. Identity framing writes the
/// payload verbatim; chunked framing writes a single size-prefixed chunk
/// followed by the zero-length terminating chunk.
pub struct IoTransport<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> IoTransport<W> {
    /// Creates a transport over the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the transport, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResponseTransport for IoTransport<W> {
    fn deliver(&mut self, payload: &[u8], framing: Framing) -> io::Result<()> {
        match framing {
            Framing::Identity => {
                self.writer.write_all(payload)?;
            }
            Framing::Chunked => {
                // Zero-length payloads go straight to the terminator: a
                // "0\r\n" data chunk would end the body prematurely.
                if !payload.is_empty() {
                    write!(self.writer, "{:X}\r\n", payload.len())?;
                    self.writer.write_all(payload)?;
                    self.writer.write_all(b"\r\n")?;
                }
                self.writer.write_all(b"0\r\n\r\n")?;
            }
        }
        self.writer.flush()?;
        trace!(bytes = payload.len(), framing = ?framing, "Response delivered");
        Ok(())
    }
}

impl<W: Write + Send> std::fmt::Debug for IoTransport<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoTransport").finish_non_exhaustive()
    }
}
