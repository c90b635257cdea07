//! Ports to the systems the poller talks to.
//!
//! The HTTP adapters implement these against the real services; tests use
//! in-memory fakes.

use crate::credential::Credential;
use crate::cursor::Cursor;
use crate::error::{CredentialError, ForwardError, StoreError, UpstreamError};
use crate::event::{ChangeEvent, ChangePage, SubscriptionStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Issues bearer tokens for the configured client id/secret.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Request a fresh access token. One network attempt, no retry.
    async fn issue_token(&self) -> Result<String, CredentialError>;
}

/// Upstream change API of the scheduling system.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Fetch changes recorded after `cursor`.
    ///
    /// With `Cursor::None` the upstream returns its current baseline.
    async fn fetch_changes(
        &self,
        credential: &Credential,
        cursor: &Cursor,
    ) -> Result<ChangePage, UpstreamError>;

    /// Current standing change subscriptions.
    async fn subscriptions(
        &self,
        credential: &Credential,
    ) -> Result<SubscriptionStatus, UpstreamError>;

    /// Create a subscription. `None` subscribes to every change event.
    async fn subscribe(
        &self,
        credential: &Credential,
        event_name: Option<&str>,
    ) -> Result<(), UpstreamError>;
}

/// Downstream consumer of normalized batches.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver the whole batch in one call.
    async fn forward(&self, batch: &[ChangeEvent]) -> Result<(), ForwardError>;
}

/// Durable cursor per feed.
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, `Cursor::None` if the feed was never advanced.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read.
    fn load(&self, feed_id: &str) -> Result<Cursor, StoreError>;

    /// Record a new cursor for the feed.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written.
    fn save(&self, feed_id: &str, cursor: &Cursor) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn issue_token(&self) -> Result<String, CredentialError> {
        (**self).issue_token().await
    }
}

#[async_trait]
impl<T: ChangeSource + ?Sized> ChangeSource for Arc<T> {
    async fn fetch_changes(
        &self,
        credential: &Credential,
        cursor: &Cursor,
    ) -> Result<ChangePage, UpstreamError> {
        (**self).fetch_changes(credential, cursor).await
    }

    async fn subscriptions(
        &self,
        credential: &Credential,
    ) -> Result<SubscriptionStatus, UpstreamError> {
        (**self).subscriptions(credential).await
    }

    async fn subscribe(
        &self,
        credential: &Credential,
        event_name: Option<&str>,
    ) -> Result<(), UpstreamError> {
        (**self).subscribe(credential, event_name).await
    }
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn forward(&self, batch: &[ChangeEvent]) -> Result<(), ForwardError> {
        (**self).forward(batch).await
    }
}
