//! Position in the upstream change feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last upstream event id that was delivered downstream.
///
/// `Cursor::None` asks the upstream for its current baseline, which is how a
/// fresh feed establishes a starting point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cursor {
    /// Nothing delivered yet
    #[default]
    None,
    /// Upstream event id of the last delivered record
    At(String),
}

impl Cursor {
    /// Build a cursor from an optional event id. Empty ids mean no cursor.
    #[must_use]
    pub fn from_event_id(event_id: Option<String>) -> Self {
        match event_id {
            Some(id) if !id.is_empty() => Self::At(id),
            _ => Self::None,
        }
    }

    /// The event id, if any.
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::At(id) => Some(id),
        }
    }

    /// Whether the feed has a position yet.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::At(id) => f.write_str(id),
        }
    }
}
