//! Response bodies of the athenahealth endpoints.
//!
//! The changed-appointments and subscription endpoints do not always answer
//! with the same shape, so each is an untagged enum over the shapes seen in
//! practice, converted to a core type in one place.

use apptsync_core::{ChangePage, RawChangeRecord, SubscriptionStatus};
use serde::Deserialize;
use serde_json::{Map, Value};

/// OAuth2 token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime hint; informational only, the configured validity is used
    #[serde(default)]
    pub expires_in: Option<Value>,
}

/// Body of `GET .../appointments/changed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChangesResponse {
    /// `{"appointments": [...], "totalcount": n}`
    Paged {
        /// Change entries, parsed individually
        appointments: Vec<Value>,
        /// Reported total, number or numeric string
        #[serde(default)]
        totalcount: Option<Value>,
    },
    /// A bare array of change entries
    Bare(Vec<Value>),
    /// Any other object: no changes
    Empty(Map<String, Value>),
}

impl ChangesResponse {
    /// Convert to a page, skipping entries that are not JSON objects.
    #[must_use]
    pub fn into_page(self) -> ChangePage {
        let (entries, total_count) = match self {
            Self::Paged {
                appointments,
                totalcount,
            } => (appointments, totalcount.as_ref().and_then(count_value)),
            Self::Bare(entries) => (entries, None),
            Self::Empty(fields) => {
                if let Some(value) = fields.get("appointments") {
                    tracing::warn!(
                        kind = value_kind(value),
                        "Unexpected appointments field, treating page as empty"
                    );
                }
                (Vec::new(), None)
            }
        };

        let records = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| parse_entry(index, entry))
            .collect();

        ChangePage {
            records,
            total_count,
        }
    }
}

fn parse_entry(index: usize, entry: Value) -> Option<RawChangeRecord> {
    if !entry.is_object() {
        tracing::warn!(index, kind = value_kind(&entry), "Skipping non-object change entry");
        return None;
    }
    match serde_json::from_value(entry) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(index, error = %e, "Skipping unparseable change entry");
            None
        }
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One subscribed event.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribedEvent {
    /// Event name, e.g. `ScheduleAppointment`
    #[serde(default)]
    pub eventname: Option<String>,
}

/// Body of `GET .../appointments/changed/subscription`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionResponse {
    /// `{"status": "ACTIVE", "subscriptions": [...]}`
    Listing {
        /// Overall subscription status
        #[serde(default)]
        status: Option<String>,
        /// Subscribed events
        subscriptions: Vec<SubscribedEvent>,
    },
    /// A bare array of subscribed events
    Bare(Vec<SubscribedEvent>),
    /// Object without a subscription list
    StatusOnly {
        /// Overall subscription status
        #[serde(default)]
        status: Option<String>,
    },
}

impl SubscriptionResponse {
    /// Convert to the core subscription status.
    #[must_use]
    pub fn into_status(self) -> SubscriptionStatus {
        let (status, events) = match self {
            Self::Listing {
                status,
                subscriptions,
            } => (status, subscriptions),
            Self::Bare(events) => (None, events),
            Self::StatusOnly { status } => (status, Vec::new()),
        };

        SubscriptionStatus {
            status,
            event_names: events
                .into_iter()
                .map(|e| e.eventname.unwrap_or_default())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(value: Value) -> ChangePage {
        serde_json::from_value::<ChangesResponse>(value)
            .unwrap()
            .into_page()
    }

    #[test]
    fn paged_response() {
        let page = changes(json!({
            "appointments": [
                {"appointmentid": "1", "appointmentstatus": "o", "eventid": "100"},
                {"appointmentid": "2", "appointmentstatus": "x", "eventid": "101"}
            ],
            "totalcount": "2"
        }));

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.last_event_id(), Some("101"));
    }

    #[test]
    fn bare_array_response() {
        let page = changes(json!([{"appointmentid": 5, "eventid": 9}]));
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].appointment_id.as_deref(), Some("5"));
        assert!(page.total_count.is_none());
    }

    #[test]
    fn object_without_appointments_is_empty() {
        let page = changes(json!({"totalcount": 0}));
        assert!(page.is_empty());

        let page = changes(json!({"appointments": "none"}));
        assert!(page.is_empty());
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let page = changes(json!({
            "appointments": ["junk", [1, 2], {"appointmentid": "3", "eventid": "7"}]
        }));
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.last_event_id(), Some("7"));
    }

    #[test]
    fn subscription_listing() {
        let status = serde_json::from_value::<SubscriptionResponse>(json!({
            "status": "ACTIVE",
            "subscriptions": [{"eventname": "ScheduleAppointment"}, {"eventname": "CancelAppointment"}]
        }))
        .unwrap()
        .into_status();

        assert!(status.is_active());
        assert_eq!(status.status.as_deref(), Some("ACTIVE"));
        assert_eq!(status.event_names.len(), 2);
    }

    #[test]
    fn subscription_without_list_is_inactive() {
        let status = serde_json::from_value::<SubscriptionResponse>(json!({"status": "UNSUBSCRIBED"}))
            .unwrap()
            .into_status();
        assert!(!status.is_active());

        let status = serde_json::from_value::<SubscriptionResponse>(json!([]))
            .unwrap()
            .into_status();
        assert!(!status.is_active());
    }

    #[test]
    fn token_response_tolerates_extra_fields() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": "3600",
            "scope": "athena/service/Athenanet.MDP.*"
        }))
        .unwrap();
        assert_eq!(token.access_token, "abc");
    }
}
