//! Error taxonomy for the poller.
//!
//! Everything except [`StartError`] is recoverable: the poll worker catches it
//! at the cycle boundary, logs it and tries again on the next tick.

/// Failure to obtain a bearer credential from the provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// The token endpoint could not be reached
    #[error("credential request error: {0}")]
    Request(String),
    /// The token endpoint answered with a non-success status
    #[error("credential rejected (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },
    /// The token response could not be parsed
    #[error("credential parse error: {0}")]
    Parse(String),
}

/// Failure talking to the upstream change API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// HTTP request failed before a response arrived
    #[error("upstream request error: {0}")]
    Request(String),
    /// API returned a non-2xx status
    #[error("upstream error (status {status}): {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// Response body was not a recognized shape
    #[error("upstream parse error: {0}")]
    Parse(String),
}

/// The downstream sink did not accept a batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForwardError {
    /// HTTP request failed before a response arrived
    #[error("forward request error: {0}")]
    Request(String),
    /// Sink answered with a non-2xx status
    #[error("sink rejected batch (status {status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Cursor persistence failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cursor store error: {0}")]
pub struct StoreError(pub String);

/// Reason a single raw record was left out of a normalized batch.
///
/// Not an error for the page: drops are logged and the rest of the page is
/// processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationDrop {
    /// No appointment id, or an empty one
    #[error("missing appointment id")]
    MissingAppointmentId,
    /// Appointment id is not an integer
    #[error("appointment id {0:?} is not an integer")]
    InvalidAppointmentId(String),
    /// Status code absent or outside the accepted set
    #[error("unrecognized status {0:?}")]
    UnrecognizedStatus(Option<String>),
    /// Date is missing or not MM/DD/YYYY
    #[error("malformed date {0:?}")]
    MalformedDate(Option<String>),
    /// Time is missing or not HH:MM
    #[error("malformed time {0:?}")]
    MalformedTime(Option<String>),
    /// Date and time name a wall-clock time that does not exist locally
    #[error("nonexistent local time {date} {time}")]
    NonexistentLocalTime {
        /// Raw date string
        date: String,
        /// Raw time string
        time: String,
    },
}

/// Any failure that ends a poll cycle early.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CycleError {
    /// Could not acquire a credential; cycle skipped
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// Could not fetch changes; cycle skipped
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Sink rejected the batch; cursor withheld
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

/// Scheduler bootstrap failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StartError {
    /// Initial credential could not be obtained
    #[error("bootstrap credential failed: {0}")]
    Credential(#[from] CredentialError),
    /// Subscription lookup or creation failed
    #[error("bootstrap subscription failed: {0}")]
    Subscription(#[from] UpstreamError),
    /// A previous run of the poll task panicked and took the worker with it
    #[error("poll worker lost: {0}")]
    WorkerLost(String),
    /// `start` was called while a stop is still in progress
    #[error("scheduler is stopping")]
    Stopping,
}
