//! HTTP client for the athenahealth API.
//!
//! One client serves one practice. It implements both the credential
//! provider and the change source ports, sharing a single connection pool.

use crate::responses::{ChangesResponse, SubscriptionResponse, TokenResponse};
use apptsync_core::{
    ChangePage, ChangeSource, Credential, CredentialError, CredentialProvider, Cursor,
    SubscriptionStatus, UpstreamError,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Preview environment base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.preview.platform.athenahealth.com";

/// Sandbox practice id of the preview environment.
pub const DEFAULT_PRACTICE_ID: &str = "195900";

/// OAuth2 scope requested with every token.
pub const DEFAULT_SCOPE: &str = "athena/service/Athenanet.MDP.*";

/// athenahealth client configuration.
#[derive(Clone)]
pub struct AthenaClientConfig {
    /// Base URL of the API, without the `/v1` prefix
    pub base_url: String,
    /// Practice whose change feed is read
    pub practice_id: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// OAuth2 scope
    pub scope: String,
    /// Request timeout, applied to every call
    pub timeout: Duration,
}

impl Default for AthenaClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            practice_id: DEFAULT_PRACTICE_ID.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for AthenaClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AthenaClientConfig")
            .field("base_url", &self.base_url)
            .field("practice_id", &self.practice_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Errors building an [`AthenaClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientInitError {
    /// Base URL is not an absolute http(s) URL
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
    /// Client id or secret is empty
    #[error("client id and secret are required")]
    MissingCredentials,
    /// Practice id is empty
    #[error("practice id is required")]
    MissingPracticeId,
    /// The HTTP client could not be built
    #[error("client init error: {0}")]
    Init(String),
}

/// HTTP client for the athenahealth token, change and subscription endpoints.
#[derive(Clone)]
pub struct AthenaClient {
    client: Client,
    config: Arc<AthenaClientConfig>,
}

impl AthenaClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not http(s), the client credentials
    /// or practice id are empty, or the HTTP client cannot be created.
    pub fn new(config: AthenaClientConfig) -> Result<Self, ClientInitError> {
        let base = Url::parse(&config.base_url).map_err(|e| ClientInitError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientInitError::InvalidUrl {
                url: config.base_url.clone(),
                reason: format!("unsupported scheme {}", base.scheme()),
            });
        }
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(ClientInitError::MissingCredentials);
        }
        if config.practice_id.trim().is_empty() {
            return Err(ClientInitError::MissingPracticeId);
        }

        let mut builder = Client::builder().timeout(config.timeout);
        if base.scheme() == "https" {
            builder = builder.use_rustls_tls();
        }
        let client = builder
            .build()
            .map_err(|e| ClientInitError::Init(e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Practice this client reads.
    #[must_use]
    pub fn practice_id(&self) -> &str {
        &self.config.practice_id
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v1/token", self.base())
    }

    fn practice_url(&self, path: &str) -> String {
        format!("{}/v1/{}/{}", self.base(), self.config.practice_id, path)
    }

    fn changes_url(&self) -> String {
        self.practice_url("appointments/changed")
    }

    fn subscription_url(&self) -> String {
        self.practice_url("appointments/changed/subscription")
    }
}

async fn status_error(response: Response) -> UpstreamError {
    UpstreamError::Status {
        status: response.status().as_u16(),
        body: response.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl CredentialProvider for AthenaClient {
    async fn issue_token(&self) -> Result<String, CredentialError> {
        let url = self.token_url();

        tracing::debug!(url, "POST token");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::Rejected {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Parse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(CredentialError::Parse("empty access_token".to_string()));
        }

        tracing::debug!(
            token_type = ?token.token_type,
            expires_in = ?token.expires_in,
            "Received access token"
        );
        Ok(token.access_token)
    }
}

#[async_trait]
impl ChangeSource for AthenaClient {
    async fn fetch_changes(
        &self,
        credential: &Credential,
        cursor: &Cursor,
    ) -> Result<ChangePage, UpstreamError> {
        let url = self.changes_url();

        tracing::debug!(url, cursor = %cursor, "GET changed appointments");

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(credential.token())
            .header(ACCEPT, "application/json");
        if let Some(event_id) = cursor.event_id() {
            request = request.query(&[("lastEventId", event_id)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(ChangePage::default());
        }

        let parsed: ChangesResponse =
            serde_json::from_str(&body).map_err(|e| UpstreamError::Parse(e.to_string()))?;
        Ok(parsed.into_page())
    }

    async fn subscriptions(
        &self,
        credential: &Credential,
    ) -> Result<SubscriptionStatus, UpstreamError> {
        let url = self.subscription_url();

        tracing::debug!(url, "GET subscription");

        let response = self
            .client
            .get(&url)
            .bearer_auth(credential.token())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: SubscriptionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;
        Ok(parsed.into_status())
    }

    async fn subscribe(
        &self,
        credential: &Credential,
        event_name: Option<&str>,
    ) -> Result<(), UpstreamError> {
        let url = self.subscription_url();

        tracing::debug!(url, event_name, "POST subscription");

        let mut form: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = event_name {
            form.push(("eventname", name));
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.token())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(())
    }
}
