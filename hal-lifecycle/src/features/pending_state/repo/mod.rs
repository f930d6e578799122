use hal_core::{Entity, EntityKey};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Identifies one marking of an entity. A later marking of the same entity
/// gets a larger ticket and supersedes the earlier one.
pub type Ticket = u64;

#[derive(Debug, Clone)]
struct PendingEntry {
    entity: Entity,
    ticket: Ticket,
}

#[derive(Debug, Default)]
struct PendingState {
    entries: HashMap<EntityKey, PendingEntry>,
    in_progress: bool,
    last_ticket: Ticket,
}

impl PendingState {
    fn remove(&mut self, key: &EntityKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.in_progress = !self.entries.is_empty();
        removed
    }
}

/// Entities with an outstanding lifecycle action.
///
/// Shared by every component that has to know whether an entity is busy.
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    state: Arc<RwLock<PendingState>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PendingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PendingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `entity` as pending, replacing any earlier snapshot.
    pub fn mark_pending(&self, entity: impl Into<Entity>) -> Ticket {
        let entity = entity.into();
        let key = entity.key();
        let mut state = self.write();
        state.last_ticket += 1;
        let ticket = state.last_ticket;
        state.entries.insert(key.clone(), PendingEntry { entity, ticket });
        state.in_progress = true;
        debug!(entity = %key, ticket, "Marked as pending");
        ticket
    }

    pub fn is_pending(&self, key: &EntityKey) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Clear the pending state of `key`. Returns whether it was pending.
    pub fn clear_pending(&self, key: &EntityKey) -> bool {
        let removed = self.write().remove(key);
        if removed {
            debug!(entity = %key, "Cleared pending state");
        }
        removed
    }

    /// Clear `key` only if `ticket` is still the current marking.
    pub fn release(&self, key: &EntityKey, ticket: Ticket) -> bool {
        let mut state = self.write();
        match state.entries.get(key) {
            Some(entry) if entry.ticket == ticket => {
                state.remove(key);
                debug!(entity = %key, ticket, "Released pending state");
                true
            }
            _ => {
                debug!(entity = %key, ticket, "Marking superseded, nothing to release");
                false
            }
        }
    }

    /// Whether `ticket` is the latest marking of `key` and still pending.
    pub fn is_current(&self, key: &EntityKey, ticket: Ticket) -> bool {
        self.read()
            .entries
            .get(key)
            .map(|entry| entry.ticket == ticket)
            .unwrap_or(false)
    }

    /// True while any entity is pending.
    pub fn lifecycle_action_in_progress(&self) -> bool {
        self.read().in_progress
    }

    pub fn pending_entities(&self) -> Vec<Entity> {
        let state = self.read();
        let mut entries: Vec<&PendingEntry> = state.entries.values().collect();
        entries.sort_by_key(|entry| entry.ticket);
        entries.into_iter().map(|entry| entry.entity.clone()).collect()
    }

    pub fn pending(&self, key: &EntityKey) -> Option<Entity> {
        self.read().entries.get(key).map(|entry| entry.entity.clone())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}
