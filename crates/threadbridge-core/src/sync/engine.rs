//! Bidirectional diff-sync of one ticket with one chat thread.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::format::{chat_to_note, note_to_chat};
use super::lock::EntityLocks;
use super::token::{RecordMatch, SyncRecord};
use crate::chat::ChatPlatform;
use crate::config::BridgeConfig;
use crate::directory::Directory;
use crate::models::{ChannelId, ChatMessage, Ticket, TicketId};
use crate::store::TicketStore;
use crate::util::with_timeout;
use crate::{Error, Result};

/// Engine settings resolved once at startup
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Ticket custom field holding the sync token
    pub sync_field_id: u64,
    /// `last_sync` for tickets that were never synchronized
    pub first_sync_epoch: DateTime<Utc>,
    /// Budget for every individual external call
    pub call_timeout: Duration,
    /// Login for notes whose chat author has no ticket-store account
    pub system_login: Option<String>,
}

impl SyncSettings {
    pub fn from_config(config: &BridgeConfig, sync_field_id: u64) -> Self {
        Self {
            sync_field_id,
            first_sync_epoch: config.first_sync_epoch,
            call_timeout: config.http_timeout,
            system_login: config.system_login.clone(),
        }
    }
}

/// Work done by one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Ticket notes posted to the thread
    pub to_chat: usize,
    /// Thread messages appended to the ticket
    pub to_ticket: usize,
    /// Whether the sync token was rewritten
    pub record_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced(SyncStats),
    /// Another pass holds the ticket; try again later
    Locked,
    /// The ticket's record belongs to another thread
    NoRecord { recorded: ChannelId },
}

pub struct Synchronizer {
    store: Arc<dyn TicketStore>,
    chat: Arc<dyn ChatPlatform>,
    directory: Arc<dyn Directory>,
    locks: EntityLocks,
    settings: SyncSettings,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn TicketStore>,
        chat: Arc<dyn ChatPlatform>,
        directory: Arc<dyn Directory>,
        locks: EntityLocks,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            chat,
            directory,
            locks,
            settings,
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one synchronization pass for `ticket_id` against `thread_id`.
    ///
    /// Thread history is read once, before any note is posted, and serves
    /// both directions. Writes still go ticket to thread first.
    ///
    /// On error nothing is persisted: notes already copied in this pass
    /// stay, and the next pass re-scans from the old sync point, skipping
    /// what it finds already copied.
    pub async fn synchronize(&self, ticket_id: TicketId, thread_id: ChannelId) -> Result<SyncOutcome> {
        let Some(_guard) = self.locks.try_lock(ticket_id) else {
            tracing::debug!(
                ticket_id = ticket_id.get(),
                thread_id = thread_id.get(),
                "Ticket locked by another pass, skipping"
            );
            return Ok(SyncOutcome::Locked);
        };

        let pass_started = Utc::now();
        let ticket = self
            .call("get_ticket", self.store.get_ticket(ticket_id, true))
            .await?
            .ok_or(Error::TicketNotFound(ticket_id))?;

        let (record, repaired) = match self.stored_record(&ticket, thread_id)? {
            None => (
                SyncRecord::new(ticket_id, thread_id, self.settings.first_sync_epoch),
                false,
            ),
            Some(RecordMatch::Valid(record)) => (record, false),
            Some(RecordMatch::Repaired(record)) => {
                tracing::info!(
                    ticket_id = ticket_id.get(),
                    thread_id = thread_id.get(),
                    "Binding legacy sync record to thread"
                );
                (record, true)
            }
            Some(RecordMatch::Mismatch { recorded }) => {
                tracing::warn!(
                    ticket_id = ticket_id.get(),
                    thread_id = thread_id.get(),
                    recorded = recorded.get(),
                    "Sync record belongs to a different thread"
                );
                return Ok(SyncOutcome::NoRecord { recorded });
            }
        };

        let history = self
            .call(
                "read_history",
                self.chat.history(record.channel_id, record.last_sync),
            )
            .await?;
        let mut stats = SyncStats {
            to_chat: self.push_notes(&ticket, &record, &history).await?,
            to_ticket: self.pull_messages(&ticket, &record, history).await?,
            record_written: false,
        };

        let dirty = stats.to_chat + stats.to_ticket > 0;
        let next = if dirty {
            Some(record.with_last_sync(watermark(pass_started)))
        } else if repaired {
            Some(record)
        } else {
            None
        };
        if let Some(next) = next {
            self.write_token(ticket_id, &next.encode()).await?;
            stats.record_written = true;
        }

        tracing::info!(
            ticket_id = ticket_id.get(),
            thread_id = thread_id.get(),
            to_chat = stats.to_chat,
            to_ticket = stats.to_ticket,
            record_written = stats.record_written,
            "Ticket synchronized"
        );
        Ok(SyncOutcome::Synced(stats))
    }

    /// Clear a ticket's sync record so the next pass starts from scratch.
    ///
    /// Returns `false` when the ticket is locked by a running pass.
    pub async fn reset_record(&self, ticket_id: TicketId) -> Result<bool> {
        let Some(_guard) = self.locks.try_lock(ticket_id) else {
            return Ok(false);
        };
        self.write_token(ticket_id, "").await?;
        tracing::warn!(ticket_id = ticket_id.get(), "Sync record cleared");
        Ok(true)
    }

    /// Decode the ticket's token and check it against `thread_id`.
    ///
    /// A token naming a channel but carrying a broken timestamp is not
    /// treated as missing: restarting from the first sync epoch would copy
    /// the whole history again.
    fn stored_record(&self, ticket: &Ticket, thread_id: ChannelId) -> Result<Option<RecordMatch>> {
        let Some(token) = ticket
            .custom_field(self.settings.sync_field_id)
            .filter(|token| !token.trim().is_empty())
        else {
            return Ok(None);
        };
        if let Some(record) = SyncRecord::decode(ticket.id, token) {
            return Ok(Some(record.match_thread(thread_id)));
        }
        match SyncRecord::recorded_channel(token) {
            Some(recorded) if recorded != thread_id => Ok(Some(RecordMatch::Mismatch { recorded })),
            _ => Err(Error::CorruptRecord {
                ticket_id: ticket.id,
                token: token.to_string(),
            }),
        }
    }

    /// Post new human notes, skipping any already posted by an earlier pass
    /// whose window overlaps this one.
    async fn push_notes(&self, ticket: &Ticket, record: &SyncRecord, history: &[ChatMessage]) -> Result<usize> {
        let mut already_posted: Vec<&str> = history
            .iter()
            .filter(|message| self.is_own(message))
            .map(|message| message.content.as_str())
            .collect();

        let mut posted = 0;
        for note in ticket.notes_after(record.last_sync) {
            if note.is_empty() || note.private_notes || note.is_chat_origin() {
                continue;
            }
            let text = note_to_chat(note);
            if take_match(&mut already_posted, &text) {
                continue;
            }
            self.call("post_message", self.chat.post(record.channel_id, &text))
                .await?;
            posted += 1;
        }
        Ok(posted)
    }

    /// Append new human messages, skipping any an earlier pass already
    /// copied into the ticket.
    async fn pull_messages(&self, ticket: &Ticket, record: &SyncRecord, mut messages: Vec<ChatMessage>) -> Result<usize> {
        let mut already_copied: Vec<&str> = ticket
            .notes_after(record.last_sync)
            .into_iter()
            .filter(|note| note.is_chat_origin())
            .map(|note| note.body.trim())
            .collect();
        messages.retain(|message| message.created_at > record.last_sync && !self.is_own(message));
        messages.sort_by_key(|message| (message.created_at, message.id));

        let mut appended = 0;
        for message in &messages {
            let author = self.directory.resolve_ticketing_identity(&message.author);
            let Some(body) = chat_to_note(message, author.is_some()) else {
                continue;
            };
            if take_match(&mut already_copied, &body) {
                continue;
            }
            let acting_login = author
                .as_ref()
                .map(|user| user.login.as_str())
                .or(self.settings.system_login.as_deref());
            self.call(
                "append_note",
                self.store.append_note(record.ticket_id, acting_login, &body),
            )
            .await?;
            appended += 1;
        }
        Ok(appended)
    }

    fn is_own(&self, message: &ChatMessage) -> bool {
        let own = self.chat.own_identity();
        match (own.id, message.author.id) {
            (Some(own_id), Some(author_id)) => own_id == author_id,
            _ => own.name.eq_ignore_ascii_case(&message.author.name),
        }
    }

    async fn write_token(&self, ticket_id: TicketId, token: &str) -> Result<()> {
        self.call(
            "update_custom_field",
            self.store
                .update_custom_field(ticket_id, self.settings.sync_field_id, token),
        )
        .await?;
        Ok(())
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_timeout(operation, self.settings.call_timeout, call).await
    }
}

/// Sync point to persist for a pass started at `pass_started`.
///
/// The ticket store keeps whole seconds and the diff is strictly "after", so
/// the point is floored to the second and moved back one more. Items in that
/// overlap are seen twice and skipped by content.
fn watermark(pass_started: DateTime<Utc>) -> DateTime<Utc> {
    pass_started.trunc_subsecs(0) - chrono::Duration::seconds(1)
}

/// Remove one occurrence of `text` from `seen`, reporting whether it was there.
fn take_match(seen: &mut Vec<&str>, text: &str) -> bool {
    let text = text.trim();
    match seen.iter().position(|candidate| candidate.trim() == text) {
        Some(index) => {
            seen.swap_remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn watermark_floors_to_the_previous_whole_second() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap()
            + chrono::Duration::milliseconds(700);
        assert_eq!(
            watermark(started),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 4).unwrap()
        );
        // A note stamped in the same second as the pass start stays "after".
        assert!(started.trunc_subsecs(0) > watermark(started));
    }

    #[test]
    fn take_match_consumes_one_occurrence() {
        let mut seen = vec!["**Dana**: +1", "**Dana**: +1 "];
        assert!(take_match(&mut seen, "**Dana**: +1"));
        assert!(take_match(&mut seen, "**Dana**: +1"));
        assert!(!take_match(&mut seen, "**Dana**: +1"));
        assert!(seen.is_empty());
    }
}
