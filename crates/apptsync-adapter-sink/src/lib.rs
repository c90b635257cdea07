//! # Sink Adapter
//!
//! Delivers normalized change batches downstream as a single JSON array per
//! request. A batch is accepted only on a 2xx answer; anything else is a
//! forward failure and the poller keeps its cursor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sink;

pub use sink::{HttpSink, SinkConfig, SinkInitError};
