//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NamedRef;

/// Leading tag on every note the bridge copies in from a chat thread.
///
/// Notes carrying it are never echoed back into chat.
pub const CHAT_ORIGIN_TAG: &str = "[via chat]";

/// An immutable note ("journal") attached to a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Journal identifier
    pub id: u64,
    /// Author of the note
    pub user: NamedRef,
    /// Body text; empty for pure field-change journals
    #[serde(default, rename = "notes")]
    pub body: String,
    /// Creation timestamp
    #[serde(rename = "created_on")]
    pub created_at: DateTime<Utc>,
    /// Visible to privileged users only
    #[serde(default)]
    pub private_notes: bool,
}

impl Note {
    /// Whether this note was copied into the ticket from a chat thread
    #[must_use]
    pub fn is_chat_origin(&self) -> bool {
        self.body.trim_start().starts_with(CHAT_ORIGIN_TAG)
    }

    /// Check if note body is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(body: &str) -> Note {
        Note {
            id: 1,
            user: NamedRef::new(5, "Dana"),
            body: body.to_string(),
            created_at: Utc::now(),
            private_notes: false,
        }
    }

    #[test]
    fn test_chat_origin_detection() {
        assert!(note("[via chat] hello").is_chat_origin());
        assert!(note("  [via chat] Sam: hello").is_chat_origin());
        assert!(!note("hello [via chat]").is_chat_origin());
        assert!(!note("plain note").is_chat_origin());
    }

    #[test]
    fn test_is_empty() {
        assert!(note(" \n ").is_empty());
        assert!(!note("x").is_empty());
    }

    #[test]
    fn test_deserialize_journal() {
        let json = r#"{
            "id": 77,
            "user": {"id": 5, "name": "Dana"},
            "notes": "looked into it",
            "created_on": "2024-03-01T10:00:00Z",
            "private_notes": false,
            "details": []
        }"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert_eq!(note.id, 77);
        assert_eq!(note.user.name, "Dana");
        assert_eq!(note.body, "looked into it");
        assert_eq!(note.created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_deserialize_field_change_without_notes() {
        let json = r#"{"id": 78, "user": {"id": 5, "name": "Dana"}, "created_on": "2024-03-01T10:00:00Z"}"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert!(note.is_empty());
    }
}
