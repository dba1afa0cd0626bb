//! Process-local, per-ticket mutual exclusion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::TicketId;

/// Set of tickets with a synchronization in flight.
///
/// The inner mutex is only held for the check-and-insert / remove
/// bookkeeping, never across an external call. Nothing is persisted, so a
/// restart always starts with every ticket unlocked.
#[derive(Clone, Default)]
pub struct EntityLocks {
    locked: Arc<Mutex<HashSet<TicketId>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `ticket_id` as locked. Returns `false` without blocking if it
    /// already is.
    pub fn try_acquire(&self, ticket_id: TicketId) -> bool {
        self.state().insert(ticket_id)
    }

    pub fn release(&self, ticket_id: TicketId) {
        self.state().remove(&ticket_id);
    }

    /// Acquire with a guard that releases on drop, including on early
    /// return, error propagation and panic unwinding.
    pub fn try_lock(&self, ticket_id: TicketId) -> Option<EntityLockGuard> {
        self.try_acquire(ticket_id).then(|| EntityLockGuard {
            locks: self.clone(),
            ticket_id,
        })
    }

    pub fn is_locked(&self, ticket_id: TicketId) -> bool {
        self.state().contains(&ticket_id)
    }

    fn state(&self) -> MutexGuard<'_, HashSet<TicketId>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held for the duration of one synchronization attempt
#[must_use = "the ticket unlocks as soon as the guard is dropped"]
pub struct EntityLockGuard {
    locks: EntityLocks,
    ticket_id: TicketId,
}

impl Drop for EntityLockGuard {
    fn drop(&mut self) {
        self.locks.release(self.ticket_id);
    }
}
