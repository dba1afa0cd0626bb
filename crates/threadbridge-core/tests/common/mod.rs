//! In-memory ticket store and chat platform for engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use threadbridge_core::directory::DirectoryCache;
use threadbridge_core::models::{
    Channel, ChannelId, ChatIdentity, ChatMessage, CustomFieldDef, CustomFieldValue, NamedRef,
    Note, Status, Team, Thread, Ticket, TicketId, TicketingIdentity,
};
use threadbridge_core::store::{TicketFilter, TicketStore, TicketUpdate};
use threadbridge_core::sync::{EntityLocks, SyncSettings, Synchronizer};
use threadbridge_core::chat::ChatPlatform;
use threadbridge_core::{Error, Result};

pub const SYNC_FIELD: u64 = 4;
pub const CHAT_FIELD: u64 = 11;
pub const BOT_ID: u64 = 1000;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn ticket(id: u64, subject: &str) -> Ticket {
    Ticket {
        id: TicketId(id),
        subject: subject.to_string(),
        status: Status {
            id: 2,
            name: "In Progress".to_string(),
            is_closed: false,
        },
        priority: NamedRef::new(2, "Normal"),
        tracker: NamedRef::new(1, "Hardware"),
        assigned_to: None,
        watchers: Vec::new(),
        created_at: at(1, 8),
        updated_at: at(1, 8),
        notes: Vec::new(),
        custom_fields: Vec::new(),
    }
}

pub fn with_token(mut ticket: Ticket, token: &str) -> Ticket {
    ticket.custom_fields.push(CustomFieldValue {
        id: SYNC_FIELD,
        name: "Discord Thread".to_string(),
        value: token.into(),
    });
    ticket
}

pub fn note(id: u64, author: &str, body: &str, created_at: DateTime<Utc>) -> Note {
    Note {
        id,
        user: NamedRef::new(id + 100, author),
        body: body.to_string(),
        created_at,
        private_notes: false,
    }
}

pub fn message(id: u64, author: ChatIdentity, content: &str, created_at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id,
        author,
        content: content.to_string(),
        created_at,
        attachments: Vec::new(),
    }
}

pub fn user(id: u64, login: &str, chat_handle: Option<&str>) -> TicketingIdentity {
    TicketingIdentity {
        id,
        login: login.to_string(),
        firstname: String::new(),
        lastname: String::new(),
        custom_fields: chat_handle
            .map(|handle| CustomFieldValue {
                id: CHAT_FIELD,
                name: "Discord ID".to_string(),
                value: handle.into(),
            })
            .into_iter()
            .collect(),
    }
}

/// Directory with `dana` linked to chat user 500 and an `Ops` team.
pub fn directory() -> Arc<DirectoryCache> {
    let cache = DirectoryCache::new(CHAT_FIELD);
    cache.load(
        vec![
            user(5, "dana", Some("500")),
            user(6, "lee", Some("@lee")),
            user(7, "kim", None),
        ],
        vec![
            Team {
                id: 90,
                name: "Ops".to_string(),
                members: vec![5, 6],
            },
            Team {
                id: 91,
                name: "users".to_string(),
                members: vec![7],
            },
        ],
    );
    Arc::new(cache)
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        sync_field_id: SYNC_FIELD,
        first_sync_epoch: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        call_timeout: Duration::from_secs(5),
        system_login: Some("bridge".to_string()),
    }
}

pub fn synchronizer(store: &Arc<FakeStore>, chat: &Arc<FakeChat>, locks: EntityLocks) -> Synchronizer {
    Synchronizer::new(
        Arc::clone(store) as Arc<dyn TicketStore>,
        Arc::clone(chat) as Arc<dyn ChatPlatform>,
        directory(),
        locks,
        settings(),
    )
}

/// A note appended through the store API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub ticket_id: TicketId,
    pub acting_login: Option<String>,
    pub body: String,
}

#[derive(Debug, Default)]
struct StoreState {
    tickets: HashMap<TicketId, Ticket>,
    appended: Vec<Appended>,
    field_writes: Vec<(TicketId, String)>,
    updates: Vec<(TicketId, TicketUpdate, Option<String>)>,
    next_note_id: u64,
    fail_field_writes: bool,
}

#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state();
            state.next_note_id = 10_000;
            for ticket in tickets {
                state.tickets.insert(ticket.id, ticket);
            }
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn ticket(&self, id: u64) -> Ticket {
        self.state().tickets[&TicketId(id)].clone()
    }

    pub fn token(&self, id: u64) -> Option<String> {
        self.ticket(id).custom_field(SYNC_FIELD).map(str::to_string)
    }

    pub fn appended(&self) -> Vec<Appended> {
        self.state().appended.clone()
    }

    pub fn field_writes(&self) -> Vec<(TicketId, String)> {
        self.state().field_writes.clone()
    }

    pub fn updates(&self) -> Vec<(TicketId, TicketUpdate, Option<String>)> {
        self.state().updates.clone()
    }

    /// Insert a note as a human would, with the store's own timestamp.
    pub fn add_note(&self, id: u64, note: Note) {
        if let Some(ticket) = self.state().tickets.get_mut(&TicketId(id)) {
            ticket.notes.push(note);
        }
    }

    /// Record a human edit at `updated_at`.
    pub fn touch(&self, id: u64, updated_at: DateTime<Utc>) {
        if let Some(ticket) = self.state().tickets.get_mut(&TicketId(id)) {
            ticket.updated_at = updated_at;
        }
    }

    pub fn fail_field_writes(&self) {
        self.state().fail_field_writes = true;
    }
}

#[async_trait]
impl TicketStore for FakeStore {
    async fn get_ticket(&self, id: TicketId, include_notes: bool) -> Result<Option<Ticket>> {
        // Give a concurrent pass the chance to run while this one holds the lock.
        tokio::task::yield_now().await;
        Ok(self.state().tickets.get(&id).cloned().map(|mut ticket| {
            if !include_notes {
                ticket.notes.clear();
            }
            ticket
        }))
    }

    async fn append_note(&self, id: TicketId, acting_login: Option<&str>, body: &str) -> Result<()> {
        let mut state = self.state();
        state.next_note_id += 1;
        let note_id = state.next_note_id;
        let ticket = state.tickets.get_mut(&id).ok_or(Error::TicketNotFound(id))?;
        ticket.notes.push(Note {
            id: note_id,
            user: NamedRef::new(1, acting_login.unwrap_or("api")),
            body: body.to_string(),
            created_at: Utc::now(),
            private_notes: false,
        });
        state.appended.push(Appended {
            ticket_id: id,
            acting_login: acting_login.map(str::to_string),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn update_custom_field(&self, id: TicketId, field_id: u64, value: &str) -> Result<Ticket> {
        let mut state = self.state();
        if state.fail_field_writes {
            return Err(Error::remote(503, "store unavailable"));
        }
        let ticket = state.tickets.get_mut(&id).ok_or(Error::TicketNotFound(id))?;
        ticket.custom_fields.retain(|field| field.id != field_id);
        ticket.custom_fields.push(CustomFieldValue {
            id: field_id,
            name: String::new(),
            value: value.into(),
        });
        let updated = ticket.clone();
        state.field_writes.push((id, value.to_string()));
        Ok(updated)
    }

    async fn update_ticket(
        &self,
        id: TicketId,
        update: &TicketUpdate,
        acting_login: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state();
        let ticket = state.tickets.get_mut(&id).ok_or(Error::TicketNotFound(id))?;
        if let Some(assignee) = update.assigned_to_id {
            ticket.assigned_to = Some(NamedRef::new(assignee, ""));
        }
        if let Some(status_id) = update.status_id {
            ticket.status.id = status_id;
        }
        ticket.updated_at = Utc::now();
        state
            .updates
            .push((id, update.clone(), acting_login.map(str::to_string)));
        Ok(())
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .state()
            .tickets
            .values()
            .filter(|ticket| filter.matches(ticket))
            .cloned()
            .collect();
        tickets.sort_by_key(|ticket| ticket.id);
        Ok(tickets)
    }

    async fn custom_field_definitions(&self) -> Result<Vec<CustomFieldDef>> {
        Ok(vec![
            CustomFieldDef {
                id: SYNC_FIELD,
                name: "Discord Thread".to_string(),
                customized_type: "issue".to_string(),
            },
            CustomFieldDef {
                id: CHAT_FIELD,
                name: "Discord ID".to_string(),
                customized_type: "user".to_string(),
            },
        ])
    }

    async fn list_users(&self) -> Result<Vec<TicketingIdentity>> {
        Ok(vec![user(5, "dana", Some("500"))])
    }

    async fn list_groups(&self) -> Result<Vec<Team>> {
        Ok(vec![Team {
            id: 91,
            name: "users".to_string(),
            members: Vec::new(),
        }])
    }
}

#[derive(Debug, Default)]
struct ChatState {
    threads: Vec<Thread>,
    channels: Vec<Channel>,
    messages: HashMap<ChannelId, Vec<ChatMessage>>,
    posts: Vec<(ChannelId, String)>,
    next_message_id: u64,
    failing: HashSet<ChannelId>,
    panicking: HashSet<ChannelId>,
    history_delay: Option<Duration>,
    threads_delay: Option<Duration>,
}

#[derive(Debug)]
pub struct FakeChat {
    identity: ChatIdentity,
    state: Mutex<ChatState>,
}

impl Default for FakeChat {
    fn default() -> Self {
        Self {
            identity: ChatIdentity::new(BOT_ID, "bridge-bot"),
            state: Mutex::new(ChatState {
                next_message_id: 50_000,
                ..ChatState::default()
            }),
        }
    }
}

impl FakeChat {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap()
    }

    pub fn add_thread(&self, id: u64, name: &str) {
        self.state().threads.push(Thread {
            id: ChannelId(id),
            name: name.to_string(),
            parent_id: Some(ChannelId(1)),
        });
    }

    pub fn add_channel(&self, id: u64, name: &str) {
        self.state().channels.push(Channel {
            id: ChannelId(id),
            name: name.to_string(),
        });
    }

    pub fn add_message(&self, thread: u64, message: ChatMessage) {
        self.state()
            .messages
            .entry(ChannelId(thread))
            .or_default()
            .push(message);
    }

    pub fn posts(&self) -> Vec<(ChannelId, String)> {
        self.state().posts.clone()
    }

    pub fn fail_history(&self, thread: u64) {
        self.state().failing.insert(ChannelId(thread));
    }

    pub fn panic_on_history(&self, thread: u64) {
        self.state().panicking.insert(ChannelId(thread));
    }

    pub fn delay_history(&self, delay: Duration) {
        self.state().history_delay = Some(delay);
    }

    pub fn delay_threads(&self, delay: Duration) {
        self.state().threads_delay = Some(delay);
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    fn own_identity(&self) -> &ChatIdentity {
        &self.identity
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        let delay = self.state().threads_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().threads.clone())
    }

    async fn history(&self, thread: ChannelId, after: DateTime<Utc>) -> Result<Vec<ChatMessage>> {
        let delay = self.state().history_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let panicking = self.state().panicking.contains(&thread);
        assert!(!panicking, "history blew up for thread {thread}");
        let state = self.state();
        if state.failing.contains(&thread) {
            return Err(Error::remote(500, "history unavailable"));
        }
        let mut messages: Vec<ChatMessage> = state
            .messages
            .get(&thread)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| message.created_at > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages)
    }

    async fn post(&self, channel: ChannelId, text: &str) -> Result<()> {
        let mut state = self.state();
        state.next_message_id += 1;
        let message = ChatMessage {
            id: state.next_message_id,
            author: self.identity.clone(),
            content: text.to_string(),
            created_at: Utc::now(),
            attachments: Vec::new(),
        };
        state.messages.entry(channel).or_default().push(message);
        state.posts.push((channel, text.to_string()));
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> Result<Option<Channel>> {
        Ok(self
            .state()
            .channels
            .iter()
            .find(|channel| channel.name.eq_ignore_ascii_case(name))
            .cloned())
    }
}
