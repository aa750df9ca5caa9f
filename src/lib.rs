//! Pollgate - long-poll request scheduling
//!
//! This library buffers long-poll HTTP requests from many simultaneous
//! clients, periodically checks whether each has new data ready, and
//! dispatches responses - immediately when data is ready, after a bounded
//! wait otherwise, or forcibly once the configured timeout elapses.
//!
//! # High-Level API
//!
//! The [`scheduler`] module provides the request manager facade:
//!
//! ```ignore
//! use pollgate::scheduler::{RequestManager, SchedulerConfig};
//!
//! let manager = RequestManager::new(SchedulerConfig::default());
//! manager.start()?;
//!
//! // The accept layer hands parsed long-poll calls to the scheduler.
//! manager.enqueue(request);
//!
//! // Orderly shutdown: every buffered request receives an empty payload.
//! manager.stop();
//! ```

pub mod scheduler;
pub mod service;
pub mod transport;

/// Version of the pollgate library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
