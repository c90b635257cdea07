//! Raw and normalized appointment change records.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One change record as the upstream API returns it.
///
/// Every field is optional and accepts either a JSON string or a number; the
/// normalizer decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChangeRecord {
    /// Appointment identifier
    #[serde(rename = "appointmentid", default, deserialize_with = "string_or_number")]
    pub appointment_id: Option<String>,
    /// One-letter upstream status code
    #[serde(
        rename = "appointmentstatus",
        default,
        deserialize_with = "string_or_number"
    )]
    pub status: Option<String>,
    /// Appointment date, MM/DD/YYYY
    #[serde(default, deserialize_with = "string_or_number")]
    pub date: Option<String>,
    /// Appointment start time, HH:MM
    #[serde(rename = "starttime", default, deserialize_with = "string_or_number")]
    pub start_time: Option<String>,
    /// Upstream change event id, used as the feed cursor
    #[serde(rename = "eventid", default, deserialize_with = "string_or_number")]
    pub event_id: Option<String>,
    /// Patient identifier, absent for open slots
    #[serde(rename = "patientid", default, deserialize_with = "string_or_number")]
    pub patient_id: Option<String>,
    /// Appointment type name
    #[serde(
        rename = "appointmenttype",
        default,
        deserialize_with = "string_or_number"
    )]
    pub appointment_type: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Appointment status after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    /// Upstream code `o`
    Booked,
    /// Upstream code `x`
    Cancelled,
    /// Upstream code `f`
    Filled,
    /// Any other code (checked in, checked out, charge entered, ...)
    Other(String),
}

impl AppointmentStatus {
    /// Map an upstream status code.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "o" => Self::Booked,
            "x" => Self::Cancelled,
            "f" => Self::Filled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether records with this status are forwarded downstream.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Wire name used in the forwarded payload.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Filled => "filled",
            Self::Other(_) => "other",
        }
    }
}

impl Serialize for AppointmentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A change record in the stable shape forwarded to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Appointment identifier
    pub appointment_id: i64,
    /// Normalized status
    pub status: AppointmentStatus,
    /// Status code as received, for consumers that need the finer upstream codes
    pub status_code: String,
    /// Appointment start, resolved in the server's local zone
    pub start_time: DateTime<FixedOffset>,
    /// Upstream change event id
    pub event_id: Option<String>,
    /// Patient identifier
    pub patient_id: Option<String>,
    /// Appointment type name
    pub appointment_type: Option<String>,
}

/// One page returned by the upstream change API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePage {
    /// Records in upstream (chronological) order
    pub records: Vec<RawChangeRecord>,
    /// Total count reported by the upstream, when present
    pub total_count: Option<u64>,
}

impl ChangePage {
    /// Create a page from records.
    #[must_use]
    pub fn new(records: Vec<RawChangeRecord>) -> Self {
        Self {
            records,
            total_count: None,
        }
    }

    /// Event id of the last record that carries one.
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .find_map(|r| r.event_id.as_deref().filter(|id| !id.is_empty()))
    }

    /// Whether the page has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Standing change subscriptions on the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStatus {
    /// Upstream status string (e.g. `ACTIVE`)
    pub status: Option<String>,
    /// Subscribed event names
    pub event_names: Vec<String>,
}

impl SubscriptionStatus {
    /// Whether any subscription exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.event_names.is_empty()
    }
}
