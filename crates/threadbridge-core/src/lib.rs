//! threadbridge-core - Ticket/thread synchronization engine
//!
//! Keeps a support ticket and its chat discussion thread mutually
//! consistent: replies on either side show up exactly once on the other,
//! and no two passes race on the same ticket. Also hosts the lifecycle
//! sweeps that remind people about idle tickets and recycle abandoned ones.

pub mod chat;
pub mod config;
pub mod control;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod sanity;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChannelId, Note, Ticket, TicketId};
