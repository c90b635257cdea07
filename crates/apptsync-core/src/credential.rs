//! Bearer credential and its renewal cache.

use crate::error::CredentialError;
use crate::ports::CredentialProvider;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tokio::sync::Mutex;

/// A short-lived bearer token.
///
/// Replaced wholesale on renewal, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential valid for `validity` from `issued_at`.
    ///
    /// A non-positive validity is clamped to one second so that
    /// `expires_at > issued_at` always holds.
    #[must_use]
    pub fn new(token: String, issued_at: DateTime<Utc>, validity: Duration) -> Self {
        let validity = validity.max(Duration::seconds(1));
        Self {
            token,
            issued_at,
            expires_at: issued_at + validity,
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token was obtained.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the token is assumed to expire.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token can still be used at `now`, keeping `refresh_threshold`
    /// in reserve before expiry.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, refresh_threshold: Duration) -> bool {
        now < self.expires_at - refresh_threshold
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"********")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// How long issued tokens are trusted.
///
/// The token endpoint does not reliably report a lifetime, so it is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    /// Assumed lifetime of an issued token
    pub validity: Duration,
    /// Renew this long before the assumed expiry
    pub refresh_threshold: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            validity: Duration::hours(1),
            refresh_threshold: Duration::minutes(5),
        }
    }
}

/// Caches one credential and renews it on demand.
///
/// Renewal happens while the slot lock is held, so concurrent callers wait
/// for the in-flight renewal and reuse its result.
pub struct CredentialCache<P> {
    provider: P,
    policy: CredentialPolicy,
    slot: Mutex<Option<Credential>>,
}

impl<P: CredentialProvider> CredentialCache<P> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(provider: P, policy: CredentialPolicy) -> Self {
        Self {
            provider,
            policy,
            slot: Mutex::new(None),
        }
    }

    /// Return a usable credential, renewing it if needed.
    ///
    /// # Errors
    ///
    /// Returns error if renewal is needed and the provider fails.
    pub async fn get_valid_credential(&self) -> Result<Credential, CredentialError> {
        self.get_valid_credential_at(Utc::now()).await
    }

    /// Same as [`get_valid_credential`](Self::get_valid_credential) with an
    /// explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns error if renewal is needed and the provider fails.
    pub async fn get_valid_credential_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot
            .as_ref()
            .filter(|c| c.is_usable_at(now, self.policy.refresh_threshold))
        {
            tracing::debug!(
                expires_in_secs = (current.expires_at - now).num_seconds(),
                "Using cached credential"
            );
            return Ok(current.clone());
        }

        tracing::info!("Refreshing credential");
        let token = self.provider.issue_token().await.map_err(|e| {
            tracing::warn!(error = %e, "Credential refresh failed");
            e
        })?;

        let credential = Credential::new(token, now, self.policy.validity);
        tracing::info!(expires_at = %credential.expires_at, "Credential refreshed");
        *slot = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential so the next request renews it.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}
