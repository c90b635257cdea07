//! # apptsync Core
//!
//! Change model, normalization and poll scheduling for the appointment
//! change-feed poller.
//!
//! This crate provides:
//! - Raw and normalized appointment change records
//! - A pure normalizer that drops malformed records instead of failing a page
//! - Ports for the credential provider, upstream change API, downstream sink
//!   and cursor store
//! - A single-flight credential cache
//! - The poll worker (one cycle) and the scheduler that drives it on a timer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credential;
pub mod cursor;
pub mod cycle;
pub mod error;
pub mod event;
pub mod normalize;
pub mod ports;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use credential::{Credential, CredentialCache, CredentialPolicy};
pub use cursor::Cursor;
pub use cycle::{PollCycleResult, PollWorker, PollerStats};
pub use error::{
    CredentialError, CycleError, ForwardError, NormalizationDrop, StartError, StoreError,
    UpstreamError,
};
pub use event::{AppointmentStatus, ChangeEvent, ChangePage, RawChangeRecord, SubscriptionStatus};
pub use normalize::{normalize, normalize_in, normalize_record};
pub use ports::{ChangeSource, CredentialProvider, CursorStore, EventSink};
pub use scheduler::{PollScheduler, SchedulerState};
