//! Agent configuration.

use apptsync_adapter_athena::client::{DEFAULT_BASE_URL, DEFAULT_PRACTICE_ID, DEFAULT_SCOPE};
use apptsync_core::cycle::DEFAULT_FAILURE_ALERT_THRESHOLD;
use apptsync_core::scheduler::DEFAULT_POLL_INTERVAL;
use apptsync_core::CredentialPolicy;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Configuration could not be loaded.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("missing required variable {0}")]
    Missing(&'static str),
    /// A variable is set to an unusable value
    #[error("invalid {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upstream API configuration
    pub athena: AthenaSettings,

    /// Downstream sink URL
    pub sink_url: String,

    /// Time between poll cycles
    pub poll_interval: Duration,

    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,

    /// Token validity and renewal margin
    pub credential_policy: CredentialPolicy,

    /// Consecutive failed cycles before failures are logged at error level
    pub failure_alert_threshold: u32,

    /// Cursor persistence
    pub persistence: PersistenceConfig,
}

/// Upstream API configuration.
#[derive(Clone)]
pub struct AthenaSettings {
    /// Base URL
    pub base_url: String,

    /// OAuth2 client id
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// OAuth2 scope
    pub scope: String,

    /// Practices to poll; one scheduler each
    pub practice_ids: Vec<String>,
}

impl fmt::Debug for AthenaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AthenaSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("scope", &self.scope)
            .field("practice_ids", &self.practice_ids)
            .finish()
    }
}

/// Where cursors are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// `SQLite` file, survives restarts
    Sqlite,
    /// Process memory only
    Memory,
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store type {other:?}, expected sqlite or memory")),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Store type
    pub store_type: StoreType,

    /// Database path (for `SQLite`)
    pub db_path: PathBuf,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `APPTSYNC_CLIENT_ID`, `APPTSYNC_CLIENT_SECRET`: OAuth2 client (required)
    /// - `APPTSYNC_SINK_URL`: downstream sink (required)
    /// - `APPTSYNC_POLL_INTERVAL_MS`: poll period, default 60000
    /// - `APPTSYNC_PRACTICE_IDS`: comma separated, default `195900`
    /// - `APPTSYNC_API_BASE_URL`: upstream base URL
    /// - `APPTSYNC_SCOPE`: OAuth2 scope
    /// - `APPTSYNC_TOKEN_VALIDITY_SECS`: default 3600
    /// - `APPTSYNC_TOKEN_REFRESH_THRESHOLD_SECS`: default 300
    /// - `APPTSYNC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `APPTSYNC_FAILURE_ALERT_THRESHOLD`: default 5
    /// - `APPTSYNC_STORE_TYPE`: `sqlite` (default) or `memory`
    /// - `APPTSYNC_DB_PATH`: default `./apptsync.db`
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or any value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing or any value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let client_id = required("APPTSYNC_CLIENT_ID")?;
        let client_secret = required("APPTSYNC_CLIENT_SECRET")?;
        let sink_url = required("APPTSYNC_SINK_URL")?;
        validate_url("APPTSYNC_SINK_URL", &sink_url)?;

        let base_url = get("APPTSYNC_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_url("APPTSYNC_API_BASE_URL", &base_url)?;

        let practice_ids = match get("APPTSYNC_PRACTICE_IDS") {
            Some(list) => parse_practice_ids(&list)?,
            None => vec![DEFAULT_PRACTICE_ID.to_string()],
        };

        let poll_interval = match get("APPTSYNC_POLL_INTERVAL_MS") {
            Some(v) => Duration::from_millis(positive("APPTSYNC_POLL_INTERVAL_MS", &v)?),
            None => DEFAULT_POLL_INTERVAL,
        };

        let request_timeout = Duration::from_secs(match get("APPTSYNC_REQUEST_TIMEOUT_SECS") {
            Some(v) => positive("APPTSYNC_REQUEST_TIMEOUT_SECS", &v)?,
            None => 30,
        });

        let defaults = CredentialPolicy::default();
        let validity = match get("APPTSYNC_TOKEN_VALIDITY_SECS") {
            Some(v) => seconds("APPTSYNC_TOKEN_VALIDITY_SECS", &v)?,
            None => defaults.validity,
        };
        let refresh_threshold = match get("APPTSYNC_TOKEN_REFRESH_THRESHOLD_SECS") {
            Some(v) => seconds("APPTSYNC_TOKEN_REFRESH_THRESHOLD_SECS", &v)?,
            None => defaults.refresh_threshold,
        };
        if refresh_threshold >= validity {
            return Err(ConfigError::Invalid {
                var: "APPTSYNC_TOKEN_REFRESH_THRESHOLD_SECS",
                reason: "must be shorter than the token validity".to_string(),
            });
        }

        let failure_alert_threshold = match get("APPTSYNC_FAILURE_ALERT_THRESHOLD") {
            Some(v) => u32::try_from(positive("APPTSYNC_FAILURE_ALERT_THRESHOLD", &v)?)
                .map_err(|e| ConfigError::Invalid {
                    var: "APPTSYNC_FAILURE_ALERT_THRESHOLD",
                    reason: e.to_string(),
                })?,
            None => DEFAULT_FAILURE_ALERT_THRESHOLD,
        };

        let store_type = match get("APPTSYNC_STORE_TYPE") {
            Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                var: "APPTSYNC_STORE_TYPE",
                reason,
            })?,
            None => StoreType::Sqlite,
        };
        let db_path = get("APPTSYNC_DB_PATH").map_or_else(|| PathBuf::from("./apptsync.db"), PathBuf::from);

        Ok(Self {
            athena: AthenaSettings {
                base_url,
                client_id,
                client_secret,
                scope: get("APPTSYNC_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
                practice_ids,
            },
            sink_url,
            poll_interval,
            request_timeout,
            credential_policy: CredentialPolicy {
                validity,
                refresh_threshold,
            },
            failure_alert_threshold,
            persistence: PersistenceConfig {
                store_type,
                db_path,
            },
        })
    }
}

fn validate_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(())
}

fn parse_practice_ids(list: &str) -> Result<Vec<String>, ConfigError> {
    let mut ids: Vec<String> = Vec::new();
    for id in list.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                var: "APPTSYNC_PRACTICE_IDS",
                reason: format!("practice id {id:?} is not numeric"),
            });
        }
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    if ids.is_empty() {
        return Err(ConfigError::Invalid {
            var: "APPTSYNC_PRACTICE_IDS",
            reason: "no practice ids".to_string(),
        });
    }
    Ok(ids)
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

fn seconds(var: &'static str, value: &str) -> Result<chrono::Duration, ConfigError> {
    let secs = i64::try_from(positive(var, value)?).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    chrono::Duration::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
        var,
        reason: "out of range".to_string(),
    })
}
