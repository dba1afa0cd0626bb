//! Ticket store capability consumed by the engine.

mod rest;

pub use rest::RestTicketStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CustomFieldDef, Team, Ticket, TicketId, TicketingIdentity};
use crate::Result;

/// Which tickets a lifecycle sweep looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub open_only: bool,
    /// Only tickets last updated strictly before this instant
    pub updated_before: Option<DateTime<Utc>>,
    /// Priority names to leave out, compared case-insensitively
    pub excluded_priorities: Vec<String>,
}

impl TicketFilter {
    pub fn open_updated_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            open_only: true,
            updated_before: Some(cutoff),
            excluded_priorities: Vec::new(),
        }
    }

    #[must_use]
    pub fn excluding_priorities(mut self, priorities: &[String]) -> Self {
        self.excluded_priorities = priorities.to_vec();
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if self.open_only && !ticket.is_open() {
            return false;
        }
        if let Some(cutoff) = self.updated_before {
            if ticket.updated_at >= cutoff {
                return false;
            }
        }
        !self
            .excluded_priorities
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(&ticket.priority.name))
    }
}

/// Partial ticket update; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
    #[serde(rename = "notes", skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Ticket-tracking backend
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Fetch one ticket; `None` when it does not exist
    async fn get_ticket(&self, id: TicketId, include_notes: bool) -> Result<Option<Ticket>>;

    /// Append a note. `acting_login` impersonates that user; `None` posts as
    /// the store credentials' own user.
    async fn append_note(&self, id: TicketId, acting_login: Option<&str>, body: &str)
        -> Result<()>;

    /// Set one custom field and return the updated ticket
    async fn update_custom_field(&self, id: TicketId, field_id: u64, value: &str)
        -> Result<Ticket>;

    async fn update_ticket(
        &self,
        id: TicketId,
        update: &TicketUpdate,
        acting_login: Option<&str>,
    ) -> Result<()>;

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>>;

    async fn custom_field_definitions(&self) -> Result<Vec<CustomFieldDef>>;

    /// Active users, with their custom fields
    async fn list_users(&self) -> Result<Vec<TicketingIdentity>>;

    /// Groups, with member ids
    async fn list_groups(&self) -> Result<Vec<Team>>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::ISSUE_JSON;

    fn ticket() -> Ticket {
        serde_json::from_str(ISSUE_JSON).unwrap()
    }

    #[test]
    fn filter_checks_open_and_cutoff() {
        let ticket = ticket();
        let after_update = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert!(TicketFilter::open_updated_before(after_update).matches(&ticket));
        assert!(!TicketFilter::open_updated_before(ticket.updated_at).matches(&ticket));

        let mut closed = ticket.clone();
        closed.status.is_closed = true;
        assert!(!TicketFilter::open_updated_before(after_update).matches(&closed));
    }

    #[test]
    fn filter_excludes_priorities_case_insensitively() {
        let ticket = ticket();
        let cutoff = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let filter = TicketFilter::open_updated_before(cutoff)
            .excluding_priorities(&["low".to_string(), "NORMAL".to_string()]);
        assert!(!filter.matches(&ticket));
    }

    #[test]
    fn update_serializes_only_set_fields() {
        let update = TicketUpdate {
            status_id: Some(1),
            note: Some("recycled".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"status_id": 1, "notes": "recycled"})
        );
    }
}
