//! Chat identity <-> ticket-store identity lookups.
//!
//! [`DirectoryCache`] is an in-memory index rebuilt only by an explicit
//! [`DirectoryCache::reindex`]; lookups never touch the network.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::models::{ChatIdentity, Team, TicketingIdentity};
use crate::store::TicketStore;
use crate::Result;

/// Lookup capability used to attribute notes and address notifications
pub trait Directory: Send + Sync {
    /// Chat identity linked to a ticket-store login
    fn resolve_chat_identity(&self, login: &str) -> Option<ChatIdentity>;

    /// Ticket-store user linked to a chat identity
    fn resolve_ticketing_identity(&self, chat: &ChatIdentity) -> Option<TicketingIdentity>;

    /// Ticket-store user by numeric id
    fn user(&self, user_id: u64) -> Option<TicketingIdentity>;

    /// Team by name, case-insensitive
    fn team(&self, name: &str) -> Option<Team>;
}

/// Counts reported after a reindex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    pub users: usize,
    pub linked_users: usize,
    pub teams: usize,
}

#[derive(Debug, Default)]
struct DirectoryIndex {
    users: HashMap<u64, TicketingIdentity>,
    by_login: HashMap<String, u64>,
    by_chat_id: HashMap<u64, u64>,
    by_chat_name: HashMap<String, u64>,
    teams: HashMap<String, Team>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Explicitly refreshed read-through cache over the store's users and groups.
///
/// Users link to chat through a custom field holding either the numeric chat
/// user id or the chat user name.
#[derive(Debug)]
pub struct DirectoryCache {
    chat_identity_field: u64,
    index: RwLock<DirectoryIndex>,
}

impl DirectoryCache {
    pub fn new(chat_identity_field: u64) -> Self {
        Self {
            chat_identity_field,
            index: RwLock::new(DirectoryIndex::default()),
        }
    }

    /// Rebuild the index from the ticket store.
    pub async fn reindex(&self, store: &dyn TicketStore) -> Result<DirectoryStats> {
        let users = store.list_users().await?;
        let teams = store.list_groups().await?;
        let stats = self.load(users, teams);
        tracing::info!(
            users = stats.users,
            linked_users = stats.linked_users,
            teams = stats.teams,
            "Directory reindexed"
        );
        Ok(stats)
    }

    /// Replace the index wholesale with the given users and teams.
    pub fn load(&self, users: Vec<TicketingIdentity>, teams: Vec<Team>) -> DirectoryStats {
        let mut index = DirectoryIndex {
            refreshed_at: Some(Utc::now()),
            ..DirectoryIndex::default()
        };

        for user in users {
            index.by_login.insert(user.login.to_lowercase(), user.id);
            if let Some(handle) = user.custom_field(self.chat_identity_field) {
                match handle.parse::<u64>() {
                    Ok(chat_id) => {
                        index.by_chat_id.insert(chat_id, user.id);
                    }
                    Err(_) => {
                        index
                            .by_chat_name
                            .insert(handle.trim_start_matches('@').to_lowercase(), user.id);
                    }
                }
            }
            index.users.insert(user.id, user);
        }
        for team in teams {
            index.teams.insert(team.name.to_lowercase(), team);
        }

        let stats = DirectoryStats {
            users: index.users.len(),
            linked_users: index.by_chat_id.len() + index.by_chat_name.len(),
            teams: index.teams.len(),
        };
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
        stats
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.read(|index| index.refreshed_at)
    }

    fn read<T>(&self, f: impl FnOnce(&DirectoryIndex) -> T) -> T {
        f(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Directory for DirectoryCache {
    fn resolve_chat_identity(&self, login: &str) -> Option<ChatIdentity> {
        self.read(|index| {
            let user = index
                .by_login
                .get(&login.to_lowercase())
                .and_then(|id| index.users.get(id))?;
            let handle = user.custom_field(self.chat_identity_field)?;
            Some(match handle.parse::<u64>() {
                Ok(chat_id) => ChatIdentity {
                    id: Some(chat_id),
                    name: user.login.clone(),
                    display_name: Some(user.display_name()),
                },
                Err(_) => ChatIdentity {
                    id: None,
                    name: handle.trim_start_matches('@').to_string(),
                    display_name: Some(user.display_name()),
                },
            })
        })
    }

    fn resolve_ticketing_identity(&self, chat: &ChatIdentity) -> Option<TicketingIdentity> {
        self.read(|index| {
            chat.id
                .and_then(|chat_id| index.by_chat_id.get(&chat_id))
                .or_else(|| index.by_chat_name.get(&chat.name.to_lowercase()))
                .and_then(|user_id| index.users.get(user_id))
                .cloned()
        })
    }

    fn user(&self, user_id: u64) -> Option<TicketingIdentity> {
        self.read(|index| index.users.get(&user_id).cloned())
    }

    fn team(&self, name: &str) -> Option<Team> {
        self.read(|index| index.teams.get(&name.trim().to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::CustomFieldValue;

    const CHAT_FIELD: u64 = 8;

    fn user(id: u64, login: &str, handle: Option<&str>) -> TicketingIdentity {
        TicketingIdentity {
            id,
            login: login.to_string(),
            firstname: login.to_uppercase(),
            lastname: String::new(),
            custom_fields: handle
                .map(|handle| CustomFieldValue {
                    id: CHAT_FIELD,
                    name: "Discord ID".to_string(),
                    value: serde_json::Value::String(handle.to_string()),
                })
                .into_iter()
                .collect(),
        }
    }

    fn cache() -> DirectoryCache {
        let cache = DirectoryCache::new(CHAT_FIELD);
        let stats = cache.load(
            vec![
                user(1, "dana", Some("4242")),
                user(2, "fox", Some("@Spooky")),
                user(3, "walter", None),
            ],
            vec![Team {
                id: 50,
                name: "Support".to_string(),
                members: vec![1, 2],
            }],
        );
        assert_eq!(
            stats,
            DirectoryStats {
                users: 3,
                linked_users: 2,
                teams: 1
            }
        );
        cache
    }

    #[test]
    fn resolves_chat_authors_by_id_then_name() {
        let cache = cache();
        let by_id = cache.resolve_ticketing_identity(&ChatIdentity::new(4242, "whoever"));
        assert_eq!(by_id.map(|user| user.login), Some("dana".to_string()));

        let by_name = cache.resolve_ticketing_identity(&ChatIdentity::new(9, "spooky"));
        assert_eq!(by_name.map(|user| user.login), Some("fox".to_string()));

        assert!(cache
            .resolve_ticketing_identity(&ChatIdentity::new(9, "stranger"))
            .is_none());
    }

    #[test]
    fn resolves_logins_to_mentions() {
        let cache = cache();
        assert_eq!(
            cache.resolve_chat_identity("DANA").map(|chat| chat.mention()),
            Some("<@4242>".to_string())
        );
        assert_eq!(
            cache.resolve_chat_identity("fox").map(|chat| chat.mention()),
            Some("@Spooky".to_string())
        );
        assert!(cache.resolve_chat_identity("walter").is_none());
        assert!(cache.resolve_chat_identity("nobody").is_none());
    }

    #[test]
    fn teams_and_users_are_looked_up_locally() {
        let cache = cache();
        assert_eq!(cache.team(" support ").map(|team| team.id), Some(50));
        assert_eq!(cache.user(3).map(|user| user.login), Some("walter".to_string()));
        assert!(cache.refreshed_at().is_some());
    }

    #[test]
    fn load_replaces_previous_index() {
        let cache = cache();
        cache.load(vec![user(9, "skinner", None)], Vec::new());
        assert!(cache.user(1).is_none());
        assert!(cache.team("support").is_none());
    }
}
