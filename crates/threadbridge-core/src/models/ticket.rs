//! Ticket model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Note;

/// Numeric ticket identifier as assigned by the ticket store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl TicketId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = std::num::ParseIntError;

    /// Accepts `42` and `#42`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('#').unwrap_or(s);
        Ok(Self(s.parse()?))
    }
}

/// `{id, name}` reference used by the ticket store for users, statuses, trackers, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

impl NamedRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Ticket status, carrying the store's open/closed flag when it sends one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_closed: bool,
}

/// Custom field value as attached to a ticket or user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl CustomFieldValue {
    /// Scalar string value; `None` for null, empty, or multi-valued fields
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value
            .as_str()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// A ticket in the ticket store. Only the fields the bridge reads are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    #[serde(default)]
    pub subject: String,
    pub status: Status,
    pub priority: NamedRef,
    pub tracker: NamedRef,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub watchers: Vec<NamedRef>,
    #[serde(rename = "created_on")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated_on")]
    pub updated_at: DateTime<Utc>,
    /// Notes, oldest first; empty unless requested
    #[serde(default, rename = "journals")]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl Ticket {
    /// Value of a custom field by numeric id
    #[must_use]
    pub fn custom_field(&self, field_id: u64) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|field| field.id == field_id)
            .and_then(CustomFieldValue::as_str)
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.status.is_closed
    }

    /// Notes strictly newer than `after`, oldest first
    pub fn notes_after(&self, after: DateTime<Utc>) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self
            .notes
            .iter()
            .filter(|note| note.created_at > after)
            .collect();
        notes.sort_by_key(|note| (note.created_at, note.id));
        notes
    }
}
