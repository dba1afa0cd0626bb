//! Ticket <-> thread synchronization.

mod engine;
mod format;
mod lock;
mod scheduler;
mod token;

pub use engine::{SyncOutcome, SyncSettings, SyncStats, Synchronizer};
pub use format::{chat_to_note, note_to_chat};
pub use lock::{EntityLockGuard, EntityLocks};
pub use scheduler::{
    find_ticket_thread, parse_ticket_id, SweepReport, SweepScheduler, SyncReply, SyncRequest,
};
pub use token::{RecordMatch, SyncRecord};
