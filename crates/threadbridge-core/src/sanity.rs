//! Fail-fast startup check of the ticket store's structure.

use std::collections::BTreeSet;

use crate::config::BridgeConfig;
use crate::models::{CustomFieldDef, Team};
use crate::store::TicketStore;
use crate::{Error, Result};

/// Custom field ids resolved from their configured names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIds {
    /// Ticket field holding the sync token
    pub sync_token: u64,
    /// User field holding the linked chat identity
    pub chat_identity: u64,
}

/// Verify everything the bridge relies on exists and resolve field ids.
///
/// All problems are collected and reported together in
/// [`Error::Misconfigured`].
pub async fn check(store: &dyn TicketStore, config: &BridgeConfig) -> Result<FieldIds> {
    let mut failures = Vec::new();

    let definitions = match store.custom_field_definitions().await {
        Ok(definitions) => definitions,
        Err(error) => {
            failures.push(format!("cannot list custom fields: {error}"));
            Vec::new()
        }
    };
    let sync_token = find_field(&definitions, &config.sync_field_name, "issue", &mut failures);
    let chat_identity = find_field(
        &definitions,
        &config.chat_identity_field_name,
        "user",
        &mut failures,
    );

    match store.list_groups().await {
        Ok(groups) => failures.extend(missing_teams(&groups, config)),
        Err(error) => failures.push(format!("cannot list teams: {error}")),
    }

    match (sync_token, chat_identity) {
        (Some(sync_token), Some(chat_identity)) if failures.is_empty() => {
            let ids = FieldIds {
                sync_token,
                chat_identity,
            };
            tracing::info!(?ids, "Sanity check passed");
            Ok(ids)
        }
        _ => Err(Error::Misconfigured(failures)),
    }
}

fn find_field(
    definitions: &[CustomFieldDef],
    name: &str,
    customized_type: &str,
    failures: &mut Vec<String>,
) -> Option<u64> {
    let found = definitions
        .iter()
        .find(|field| {
            field.customized_type == customized_type && field.name.eq_ignore_ascii_case(name)
        })
        .map(|field| field.id);
    if found.is_none() {
        failures.push(format!("{customized_type} custom field '{name}' is missing"));
    }
    found
}

fn missing_teams(groups: &[Team], config: &BridgeConfig) -> Vec<String> {
    let required: BTreeSet<&str> = std::iter::once(config.default_team.as_str())
        .chain(config.tracker_teams.values().map(String::as_str))
        .collect();
    required
        .into_iter()
        .filter(|team| !groups.iter().any(|group| group.name.eq_ignore_ascii_case(team)))
        .map(|team| format!("team '{team}' is missing"))
        .collect()
}
