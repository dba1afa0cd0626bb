//! Chat-side models: threads, channels, messages and identities

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat channel or thread identifier. Zero means "no channel".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl ChannelId {
    pub const UNSET: Self = Self(0);

    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat user as seen by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIdentity {
    /// Platform user id, when known
    pub id: Option<u64>,
    /// Unique user name
    pub name: String,
    /// Display name, when different from `name`
    pub display_name: Option<String>,
}

impl ChatIdentity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            display_name: None,
        }
    }

    /// Name a human would recognise
    #[must_use]
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Inline mention; falls back to a plain `@name` when the id is unknown
    #[must_use]
    pub fn mention(&self) -> String {
        match self.id {
            Some(id) => format!("<@{id}>"),
            None => format!("@{}", self.name),
        }
    }
}

/// A chat message; immutable once read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub author: ChatIdentity,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// URLs of files attached to the message
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Discussion thread hanging off a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ChannelId,
    pub name: String,
    pub parent_id: Option<ChannelId>,
}

/// Top-level chat channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_prefers_id() {
        assert_eq!(ChatIdentity::new(99, "sam").mention(), "<@99>");
        let by_name = ChatIdentity {
            id: None,
            name: "sam".to_string(),
            display_name: Some("Sam S.".to_string()),
        };
        assert_eq!(by_name.mention(), "@sam");
        assert_eq!(by_name.display(), "Sam S.");
    }

    #[test]
    fn unset_channel() {
        assert!(ChannelId::UNSET.is_unset());
        assert!(!ChannelId(5).is_unset());
    }
}
