mod blocked;
mod clock;
mod conflict;
mod error;
mod interval;
mod mutations;
mod occupied;
mod policy;
mod queries;
mod schedule;
mod slots;
mod store;

pub use blocked::resolve_blocked;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::EngineError;
pub use interval::{intersect, merge, merge_overlapping, subtract, subtract_intervals};
pub use occupied::resolve_occupied;
pub use policy::{BookingWindow, filter_by_policy};
pub use schedule::{active_rule, resolve_open};
pub use slots::{ScheduleView, free_intervals, generate_slots, walk_free};
pub use store::InMemoryStore;

use std::sync::Arc;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;

pub type SharedProviderState = Arc<RwLock<ProviderState>>;

/// Availability engine over an in-memory set of providers.
///
/// Reads take a provider's read lock; writes take its write lock, so a
/// booking's check-and-insert is serialized against every other write for
/// that provider.
pub struct Engine {
    pub(super) store: InMemoryStore,
    clock: Arc<dyn Clock>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: InMemoryStore::new(),
            clock,
        }
    }

    pub fn get_provider(&self, id: &Ulid) -> Option<SharedProviderState> {
        self.store.get_provider(id)
    }

    pub fn get_provider_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.store.get_provider_for_entity(entity_id)
    }

    pub fn list_providers(&self) -> Vec<Ulid> {
        self.store.provider_ids()
    }

    /// Current wall-clock time in the provider's local zone.
    pub(super) fn local_now(&self, tz: Tz) -> NaiveDateTime {
        self.clock.now().with_timezone(&tz).naive_local()
    }

    pub(super) async fn read_provider(
        &self,
        provider_id: Ulid,
    ) -> Result<OwnedRwLockReadGuard<ProviderState>, EngineError> {
        let rs = self
            .get_provider(&provider_id)
            .ok_or(EngineError::NotFound(provider_id))?;
        Ok(rs.read_owned().await)
    }

    pub(super) async fn write_provider(
        &self,
        provider_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ProviderState>, EngineError> {
        let rs = self
            .get_provider(&provider_id)
            .ok_or(EngineError::NotFound(provider_id))?;
        Ok(rs.write_owned().await)
    }

    /// Lookup entity → provider, get provider, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<ProviderState>), EngineError> {
        let provider_id = self
            .get_provider_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let guard = self.write_provider(provider_id).await?;
        Ok((provider_id, guard))
    }
}
