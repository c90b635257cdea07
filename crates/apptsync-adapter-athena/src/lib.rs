//! # athenahealth Adapter
//!
//! HTTP client for the parts of the athenahealth API the poller uses:
//!
//! - **Token endpoint**: OAuth2 client-credentials grant with HTTP basic auth
//! - **Changed appointments**: `GET /v1/{practiceId}/appointments/changed`,
//!   optionally after a `lastEventId`
//! - **Change subscription**: `GET`/`POST /v1/{practiceId}/appointments/changed/subscription`
//!
//! Upstream bodies come in several shapes (wrapped object, bare array, empty
//! object). They are parsed into the variant types in [`responses`] and
//! converted to core types here, so callers never inspect raw JSON.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod responses;

pub use client::{AthenaClient, AthenaClientConfig, ClientInitError};
pub use responses::{ChangesResponse, SubscriptionResponse, TokenResponse};
