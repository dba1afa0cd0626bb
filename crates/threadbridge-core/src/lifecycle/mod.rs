//! Reminders for inactive tickets and recycling of abandoned ones.
//!
//! Both sweeps are read-then-act: the candidate set is whatever the store
//! returns when the sweep starts. A ticket a human resolves mid-sweep can
//! still get a reminder or be recycled; the next sweep sees the new state.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::ChatPlatform;
use crate::config::BridgeConfig;
use crate::directory::Directory;
use crate::models::{ChannelId, NamedRef, Ticket};
use crate::store::{TicketFilter, TicketStore, TicketUpdate};
use crate::sync::SyncRecord;
use crate::util::{age_in_days, with_timeout};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub dusty_after: chrono::Duration,
    pub recycle_after: chrono::Duration,
    /// Priorities never reminded about
    pub excluded_priorities: Vec<String>,
    /// Tracker name -> channel name for notifications
    pub tracker_channels: BTreeMap<String, String>,
    /// Tracker name -> owning team name
    pub tracker_teams: BTreeMap<String, String>,
    pub default_team: String,
    pub admin_channel: String,
    pub new_status_id: u64,
    pub sync_field_id: u64,
    pub system_login: Option<String>,
    pub call_timeout: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &BridgeConfig, sync_field_id: u64) -> Self {
        Self {
            dusty_after: chrono::Duration::days(i64::from(config.dusty_days)),
            recycle_after: chrono::Duration::days(i64::from(config.recycle_days)),
            excluded_priorities: config.excluded_priorities.clone(),
            tracker_channels: config.tracker_channels.clone(),
            tracker_teams: config.tracker_teams.clone(),
            default_team: config.default_team.clone(),
            admin_channel: config.admin_channel.clone(),
            new_status_id: config.new_status_id,
            sync_field_id,
            system_login: config.system_login.clone(),
            call_timeout: config.http_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAge {
    Fresh,
    /// Past the reminder threshold
    Dusty,
    /// Past the recycle threshold
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub candidates: usize,
    pub recycled: usize,
    pub notified: usize,
    /// Acted on, but no channel could be found to tell anyone
    pub unnotified: usize,
    pub failed: usize,
}

pub struct LifecycleManager {
    store: Arc<dyn TicketStore>,
    chat: Arc<dyn ChatPlatform>,
    directory: Arc<dyn Directory>,
    settings: LifecycleSettings,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn TicketStore>,
        chat: Arc<dyn ChatPlatform>,
        directory: Arc<dyn Directory>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            chat,
            directory,
            settings,
        }
    }

    pub fn classify(&self, ticket: &Ticket, now: DateTime<Utc>) -> TicketAge {
        let idle = now - ticket.updated_at;
        if idle > self.settings.recycle_after {
            TicketAge::Stale
        } else if idle > self.settings.dusty_after {
            TicketAge::Dusty
        } else {
            TicketAge::Fresh
        }
    }

    /// Recycle first so recycled tickets, now freshly updated, drop out of
    /// the reminder query.
    pub async fn run_sweeps(&self, now: DateTime<Utc>) {
        match self.recycle_sweep(now).await {
            Ok(report) => tracing::info!(?report, "Recycle sweep finished"),
            Err(error) => tracing::error!(%error, "Recycle sweep failed"),
        }
        match self.dusty_sweep(now).await {
            Ok(report) => tracing::info!(?report, "Dusty sweep finished"),
            Err(error) => tracing::error!(%error, "Dusty sweep failed"),
        }
    }

    /// Open, non-excluded tickets idle past the reminder threshold
    pub async fn dusty_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let filter = TicketFilter::open_updated_before(now - self.settings.dusty_after)
            .excluding_priorities(&self.settings.excluded_priorities);
        self.call("list_tickets", self.store.list_tickets(&filter))
            .await
    }

    /// Open tickets idle past the recycle threshold
    pub async fn recycle_candidates(&self, now: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let filter = TicketFilter::open_updated_before(now - self.settings.recycle_after);
        self.call("list_tickets", self.store.list_tickets(&filter))
            .await
    }

    /// Post a reminder for every dusty ticket.
    pub async fn dusty_sweep(&self, now: DateTime<Utc>) -> Result<LifecycleReport> {
        let tickets = self.dusty_candidates(now).await?;
        let mut report = LifecycleReport {
            candidates: tickets.len(),
            ..LifecycleReport::default()
        };

        for ticket in &tickets {
            match self.remind(ticket, now).await {
                Ok(true) => report.notified += 1,
                Ok(false) => report.unnotified += 1,
                Err(error) => {
                    tracing::error!(ticket_id = ticket.id.get(), %error, "Reminder failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Hand every stale ticket back to its owning team.
    pub async fn recycle_sweep(&self, now: DateTime<Utc>) -> Result<LifecycleReport> {
        let tickets = self.recycle_candidates(now).await?;
        let mut report = LifecycleReport {
            candidates: tickets.len(),
            ..LifecycleReport::default()
        };

        for ticket in &tickets {
            match self.recycle(ticket, now).await {
                Ok(notified) => {
                    report.recycled += 1;
                    if notified {
                        report.notified += 1;
                    } else {
                        report.unnotified += 1;
                    }
                }
                Err(error) => {
                    tracing::error!(ticket_id = ticket.id.get(), %error, "Recycle failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn remind(&self, listed: &Ticket, now: DateTime<Utc>) -> Result<bool> {
        // Listings carry no watchers.
        let detailed = self
            .call("get_ticket", self.store.get_ticket(listed.id, false))
            .await?;
        let ticket = detailed.as_ref().unwrap_or(listed);

        let Some(channel) = self.notification_channel(ticket).await? else {
            tracing::warn!(ticket_id = ticket.id.get(), "No channel to post reminder in");
            return Ok(false);
        };
        let text = self.reminder_text(ticket, now);
        self.call("post_message", self.chat.post(channel, &text))
            .await?;
        tracing::info!(ticket_id = ticket.id.get(), channel = channel.get(), "Reminder posted");
        Ok(true)
    }

    async fn recycle(&self, ticket: &Ticket, now: DateTime<Utc>) -> Result<bool> {
        let team_name = self
            .settings
            .tracker_teams
            .get(&ticket.tracker.name)
            .unwrap_or(&self.settings.default_team);
        let team = self
            .directory
            .team(team_name)
            .ok_or_else(|| Error::Config(format!("unknown team '{team_name}'")))?;

        let days = age_in_days(ticket.updated_at, now);
        let update = TicketUpdate {
            assigned_to_id: Some(team.id),
            status_id: Some(self.settings.new_status_id),
            note: Some(format!(
                "No updates for {days} days: reassigned to {} and reset to new.",
                team.name
            )),
        };
        self.call(
            "update_ticket",
            self.store
                .update_ticket(ticket.id, &update, self.settings.system_login.as_deref()),
        )
        .await?;
        tracing::info!(ticket_id = ticket.id.get(), team = %team.name, "Ticket recycled");

        let Some(channel) = self.notification_channel(ticket).await? else {
            tracing::warn!(ticket_id = ticket.id.get(), "No channel to announce recycle in");
            return Ok(false);
        };
        let members: Vec<String> = team
            .members
            .iter()
            .map(|member| self.user_mention(*member, None))
            .collect();
        let mut text = format!(
            "Ticket #{} \"{}\" had no updates for {days} days and was handed back to {}.",
            ticket.id, ticket.subject, team.name
        );
        if !members.is_empty() {
            text.push(' ');
            text.push_str(&members.join(" "));
        }
        self.call("post_message", self.chat.post(channel, &text))
            .await?;
        Ok(true)
    }

    fn reminder_text(&self, ticket: &Ticket, now: DateTime<Utc>) -> String {
        let mut text = format!(
            "Ticket #{} \"{}\" has had no updates for {} days.",
            ticket.id,
            ticket.subject,
            age_in_days(ticket.updated_at, now)
        );
        match &ticket.assigned_to {
            Some(assignee) => {
                text.push_str(" Assigned to ");
                text.push_str(&self.mention(assignee));
                text.push('.');
            }
            None => text.push_str(" Nobody is assigned."),
        }
        let watchers: Vec<String> = ticket
            .watchers
            .iter()
            .filter(|watcher| ticket.assigned_to.as_ref().map(|a| a.id) != Some(watcher.id))
            .map(|watcher| self.mention(watcher))
            .collect();
        if !watchers.is_empty() {
            text.push_str(" Watchers: ");
            text.push_str(&watchers.join(", "));
        }
        text
    }

    fn mention(&self, who: &NamedRef) -> String {
        self.user_mention(who.id, Some(&who.name))
    }

    /// Chat mention when the user is linked, otherwise their name.
    fn user_mention(&self, user_id: u64, fallback: Option<&str>) -> String {
        let user = self.directory.user(user_id);
        user.as_ref()
            .and_then(|user| self.directory.resolve_chat_identity(&user.login))
            .map(|chat| chat.mention())
            .or_else(|| user.as_ref().map(crate::models::TicketingIdentity::display_name))
            .or_else(|| fallback.map(str::to_string))
            .unwrap_or_else(|| format!("user #{user_id}"))
    }

    /// Synced thread, else the tracker's channel, else the admin channel.
    async fn notification_channel(&self, ticket: &Ticket) -> Result<Option<ChannelId>> {
        let synced = ticket
            .custom_field(self.settings.sync_field_id)
            .and_then(|token| SyncRecord::decode(ticket.id, token))
            .filter(|record| !record.is_legacy());
        if let Some(record) = synced {
            return Ok(Some(record.channel_id));
        }

        if let Some(name) = self.settings.tracker_channels.get(&ticket.tracker.name) {
            if let Some(channel) = self
                .call("resolve_channel", self.chat.resolve_channel(name))
                .await?
            {
                return Ok(Some(channel.id));
            }
            tracing::warn!(tracker = %ticket.tracker.name, channel = %name, "Tracker channel not found");
        }

        Ok(self
            .call(
                "resolve_channel",
                self.chat.resolve_channel(&self.settings.admin_channel),
            )
            .await?
            .map(|channel| channel.id))
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_timeout(operation, self.settings.call_timeout, call).await
    }
}
