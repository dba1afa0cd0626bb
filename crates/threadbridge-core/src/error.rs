//! Error types for threadbridge-core

use std::time::Duration;

use thiserror::Error;

use crate::models::TicketId;

/// Result type alias using threadbridge-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in threadbridge-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Non-2xx answer from the ticket store or the chat platform
    #[error("Remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// External call exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Ticket does not exist in the store
    #[error("Ticket not found: #{0}")]
    TicketNotFound(TicketId),

    /// No chat thread carries the ticket's name
    #[error("No thread named 'Ticket #{0}' found")]
    ThreadNotFound(TicketId),

    /// Sync token names a channel but its timestamp cannot be read
    #[error("Unreadable sync record on ticket #{ticket_id}: {token:?}")]
    CorruptRecord { ticket_id: TicketId, token: String },

    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structural misconfiguration found by the startup sanity check
    #[error("Sanity check failed: {}", .0.join("; "))]
    Misconfigured(Vec<String>),

    /// Local socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Whether the next scheduled sweep may succeed where this attempt failed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Http(_) => true,
            Self::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
