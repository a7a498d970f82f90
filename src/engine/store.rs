use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::model::*;

use super::SharedProviderState;

/// Provider states plus a reverse index from every record id to its provider.
pub struct InMemoryStore {
    providers: DashMap<Ulid, SharedProviderState>,
    entity_to_provider: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
            entity_to_provider: DashMap::new(),
        }
    }

    // ── Providers ────────────────────────────────────────────

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn get_provider(&self, id: &Ulid) -> Option<SharedProviderState> {
        self.providers.get(id).map(|e| e.value().clone())
    }

    /// Insert `state` under `id` unless a provider is already there, in which
    /// case the existing state is returned untouched.
    pub fn try_insert_provider(
        &self,
        id: Ulid,
        state: SharedProviderState,
    ) -> Result<(), SharedProviderState> {
        match self.providers.entry(id) {
            Entry::Occupied(e) => Err(e.get().clone()),
            Entry::Vacant(e) => {
                e.insert(state);
                Ok(())
            }
        }
    }

    pub fn provider_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.providers.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn get_provider_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_provider.get(entity_id).map(|e| *e.value())
    }

    pub fn map_entity(&self, entity_id: Ulid, provider_id: Ulid) {
        self.entity_to_provider.insert(entity_id, provider_id);
    }

    pub fn unmap_entity(&self, entity_id: &Ulid) {
        self.entity_to_provider.remove(entity_id);
    }

    /// Map every record held by `state` to its provider.
    pub fn index_state(&self, state: &ProviderState) {
        let pid = state.provider.id;
        for id in entity_ids(state) {
            self.map_entity(id, pid);
        }
    }

    /// Drop index entries for every record held by `state`.
    pub fn unindex_state(&self, state: &ProviderState) {
        for id in entity_ids(state) {
            self.unmap_entity(&id);
        }
    }
}

fn entity_ids(state: &ProviderState) -> impl Iterator<Item = Ulid> + '_ {
    state
        .rules
        .iter()
        .map(|r| r.id)
        .chain(state.blocked.iter().map(|b| b.id))
        .chain(state.services.iter().map(|s| s.id))
        .chain(state.bookings.iter().map(|b| b.id))
}
