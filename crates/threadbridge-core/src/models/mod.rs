//! Data models for threadbridge

mod chat;
mod directory;
mod note;
mod ticket;

pub use chat::{Channel, ChannelId, ChatIdentity, ChatMessage, Thread};
pub use directory::{CustomFieldDef, Team, TicketingIdentity};
pub use note::{Note, CHAT_ORIGIN_TAG};
pub use ticket::{CustomFieldValue, NamedRef, Status, Ticket, TicketId};

#[cfg(test)]
pub(crate) use ticket::tests::ISSUE_JSON;
