use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use threadbridge_core::chat::{ChatPlatform, DiscordChat};
use threadbridge_core::config::BridgeConfig;
use threadbridge_core::directory::{Directory, DirectoryCache};
use threadbridge_core::lifecycle::{LifecycleManager, LifecycleSettings};
use threadbridge_core::models::{ChannelId, Ticket, TicketId};
use threadbridge_core::sanity::{self, FieldIds};
use threadbridge_core::store::{RestTicketStore, TicketStore};
use threadbridge_core::sync::{EntityLocks, SyncOutcome, SyncReply, SyncSettings, Synchronizer};
use threadbridge_core::util::age_in_days;

use crate::error::CliError;

pub fn load_config() -> Result<BridgeConfig, CliError> {
    let config = BridgeConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

pub fn open_store(config: &BridgeConfig) -> Result<RestTicketStore, CliError> {
    Ok(RestTicketStore::new(
        &config.ticket_store_url,
        &config.ticket_store_api_key,
        config.http_timeout,
    )?)
}

/// Both adapters plus the startup state every command needs
pub struct Bridge {
    pub config: BridgeConfig,
    pub field_ids: FieldIds,
    pub store: Arc<dyn TicketStore>,
    pub chat: Arc<dyn ChatPlatform>,
    pub directory: Arc<DirectoryCache>,
}

impl Bridge {
    /// Sanity-check the store, log in to chat and index the directory.
    pub async fn connect(config: BridgeConfig) -> Result<Self, CliError> {
        let store = open_store(&config)?;
        let field_ids = sanity::check(&store, &config).await?;
        let chat = DiscordChat::connect(
            &config.chat_api_url,
            &config.chat_bot_token,
            config.chat_guild_id,
            config.http_timeout,
        )
        .await?;
        tracing::info!(bot = %chat.own_identity().name, "Connected to chat");

        let directory = Arc::new(DirectoryCache::new(field_ids.chat_identity));
        directory.reindex(&store).await?;

        Ok(Self {
            config,
            field_ids,
            store: Arc::new(store),
            chat: Arc::new(chat),
            directory,
        })
    }

    pub fn synchronizer(&self, locks: EntityLocks) -> Synchronizer {
        Synchronizer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chat),
            Arc::clone(&self.directory) as Arc<dyn Directory>,
            locks,
            SyncSettings::from_config(&self.config, self.field_ids.sync_token),
        )
    }

    pub fn lifecycle(&self) -> LifecycleManager {
        LifecycleManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chat),
            Arc::clone(&self.directory) as Arc<dyn Directory>,
            LifecycleSettings::from_config(&self.config, self.field_ids.sync_token),
        )
    }
}

pub fn describe_outcome(ticket_id: TicketId, thread_id: ChannelId, outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Synced(stats) if stats.to_chat + stats.to_ticket == 0 => {
            format!("Ticket #{ticket_id} is up to date with thread {thread_id}")
        }
        SyncOutcome::Synced(stats) => format!(
            "Synced ticket #{ticket_id} with thread {thread_id}: {} note(s) to chat, {} message(s) to ticket",
            stats.to_chat, stats.to_ticket
        ),
        SyncOutcome::Locked => {
            format!("Ticket #{ticket_id} is being synchronized by another pass; try again shortly")
        }
        SyncOutcome::NoRecord { recorded } => format!(
            "Ticket #{ticket_id} is bound to thread {recorded}, not {thread_id}. Use --repair to rebind it."
        ),
    }
}

/// Outcome line, preceded by a note when the record was cleared first
pub fn describe_reply(ticket_id: TicketId, reply: &SyncReply) -> String {
    let outcome = describe_outcome(ticket_id, reply.thread_id, &reply.outcome);
    if reply.record_cleared {
        format!("Cleared the sync record of ticket #{ticket_id}\n{outcome}")
    } else {
        outcome
    }
}

#[derive(Debug, Serialize)]
pub struct CandidateItem {
    pub id: u64,
    pub subject: String,
    pub tracker: String,
    pub priority: String,
    pub assignee: Option<String>,
    pub idle_days: i64,
}

pub fn candidate_item(ticket: &Ticket, now: DateTime<Utc>) -> CandidateItem {
    CandidateItem {
        id: ticket.id.get(),
        subject: ticket.subject.clone(),
        tracker: ticket.tracker.name.clone(),
        priority: ticket.priority.name.clone(),
        assignee: ticket.assigned_to.as_ref().map(|assignee| assignee.name.clone()),
        idle_days: age_in_days(ticket.updated_at, now),
    }
}

pub fn format_candidate_line(item: &CandidateItem) -> String {
    let assignee = item.assignee.as_deref().unwrap_or("unassigned");
    format!(
        "#{:<6} {:>4}d  {}/{}  {} ({assignee})",
        item.id, item.idle_days, item.tracker, item.priority, item.subject
    )
}
