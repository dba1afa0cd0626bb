//! Ticket-store users, teams and custom field definitions

use serde::{Deserialize, Serialize};

use super::CustomFieldValue;

/// A user account in the ticket store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketingIdentity {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl TicketingIdentity {
    /// "First Last", falling back to the login
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.firstname.trim(), self.lastname.trim());
        let name = name.trim();
        if name.is_empty() {
            self.login.clone()
        } else {
            name.to_string()
        }
    }

    #[must_use]
    pub fn custom_field(&self, field_id: u64) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|field| field.id == field_id)
            .and_then(CustomFieldValue::as_str)
    }
}

/// A group of users that can own tickets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    /// Member user ids
    #[serde(default)]
    pub members: Vec<u64>,
}

/// Custom field definition as exposed by the ticket store schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    pub id: u64,
    pub name: String,
    /// What the field hangs off: `issue`, `user`, ...
    pub customized_type: String,
}
