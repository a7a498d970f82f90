use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::RwLock;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{
    check_no_conflict, validate_block, validate_rule, validate_service, validate_settings,
};
use super::queries::slot_available;
use super::{Engine, EngineError};

impl Engine {
    pub async fn create_provider(&self, provider: Provider) -> Result<(), EngineError> {
        validate_settings(&provider.settings)?;
        if self.store.provider_count() >= MAX_PROVIDERS {
            return Err(EngineError::LimitExceeded("too many providers"));
        }
        let id = provider.id;
        let state = Arc::new(RwLock::new(ProviderState::new(provider)));
        if self.store.try_insert_provider(id, state).is_err() {
            return Err(EngineError::AlreadyExists(id));
        }
        metrics::gauge!(observability::PROVIDERS_ACTIVE).set(self.store.provider_count() as f64);
        info!(provider = %id, "provider created");
        Ok(())
    }

    /// Replace a provider's records wholesale with a freshly fetched snapshot.
    ///
    /// Individual malformed rules or blocks are kept; they contribute nothing
    /// at query time rather than failing the load.
    pub async fn load_snapshot(&self, snapshot: ProviderSnapshot) -> Result<(), EngineError> {
        validate_settings(&snapshot.provider.settings)?;
        if snapshot.rules.len() > MAX_RULES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many rules"));
        }
        if snapshot.blocked.len() > MAX_BLOCKED_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many blocked slots"));
        }
        if snapshot.services.len() > MAX_SERVICES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        if snapshot.bookings.len() > MAX_BOOKINGS_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }

        let id = snapshot.provider.id;
        let state = ProviderState::from_snapshot(snapshot);
        let (rules, bookings) = (state.rules.len(), state.bookings.len());

        let mut guard = match self.get_provider(&id) {
            Some(rs) => rs.write_owned().await,
            None => {
                if self.store.provider_count() >= MAX_PROVIDERS {
                    return Err(EngineError::LimitExceeded("too many providers"));
                }
                // Locked before it is published.
                let fresh = Arc::new(RwLock::new(ProviderState::new(state.provider.clone())));
                let placeholder = fresh.clone().write_owned().await;
                match self.store.try_insert_provider(id, fresh) {
                    Ok(()) => {
                        metrics::gauge!(observability::PROVIDERS_ACTIVE)
                            .set(self.store.provider_count() as f64);
                        placeholder
                    }
                    Err(existing) => {
                        drop(placeholder);
                        existing.write_owned().await
                    }
                }
            }
        };
        self.store.unindex_state(&guard);
        self.store.index_state(&state);
        *guard = state;
        info!(provider = %id, rules, bookings, "provider snapshot loaded");
        Ok(())
    }

    pub async fn update_settings(
        &self,
        provider_id: Ulid,
        settings: BookingSettings,
    ) -> Result<(), EngineError> {
        validate_settings(&settings)?;
        let mut guard = self.write_provider(provider_id).await?;
        guard.provider.settings = settings;
        Ok(())
    }

    // ── Weekly rules ─────────────────────────────────────────

    /// Insert a rule, or replace the rule with the same id.
    pub async fn upsert_rule(&self, provider_id: Ulid, rule: WeeklyRule) -> Result<(), EngineError> {
        validate_rule(&rule)?;
        let mut guard = self.write_provider(provider_id).await?;
        if let Some(existing) = guard.rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
            return Ok(());
        }
        if self.get_provider_for_entity(&rule.id).is_some() {
            return Err(EngineError::AlreadyExists(rule.id));
        }
        if guard.rules.len() >= MAX_RULES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many rules"));
        }
        self.store.map_entity(rule.id, provider_id);
        guard.rules.push(rule);
        Ok(())
    }

    pub async fn remove_rule(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (provider_id, mut guard) = self.resolve_entity_write(&id).await?;
        let before = guard.rules.len();
        guard.rules.retain(|r| r.id != id);
        if guard.rules.len() == before {
            return Err(EngineError::NotFound(id));
        }
        self.store.unmap_entity(&id);
        Ok(provider_id)
    }

    // ── Blocked slots ────────────────────────────────────────

    pub async fn add_blocked_slot(&self, provider_id: Ulid, block: BlockedSlot) -> Result<(), EngineError> {
        validate_block(&block)?;
        let mut guard = self.write_provider(provider_id).await?;
        if self.get_provider_for_entity(&block.id).is_some() {
            return Err(EngineError::AlreadyExists(block.id));
        }
        if guard.blocked.len() >= MAX_BLOCKED_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many blocked slots"));
        }
        self.store.map_entity(block.id, provider_id);
        guard.blocked.push(block);
        Ok(())
    }

    pub async fn remove_blocked_slot(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (provider_id, mut guard) = self.resolve_entity_write(&id).await?;
        let before = guard.blocked.len();
        guard.blocked.retain(|b| b.id != id);
        if guard.blocked.len() == before {
            return Err(EngineError::NotFound(id));
        }
        self.store.unmap_entity(&id);
        Ok(provider_id)
    }

    // ── Services ─────────────────────────────────────────────

    /// Insert a service, or replace the service with the same id.
    pub async fn upsert_service(&self, provider_id: Ulid, service: Service) -> Result<(), EngineError> {
        validate_service(&service)?;
        let mut guard = self.write_provider(provider_id).await?;
        if let Some(existing) = guard.services.iter_mut().find(|s| s.id == service.id) {
            *existing = service;
            return Ok(());
        }
        if self.get_provider_for_entity(&service.id).is_some() {
            return Err(EngineError::AlreadyExists(service.id));
        }
        if guard.services.len() >= MAX_SERVICES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        self.store.map_entity(service.id, provider_id);
        guard.services.push(service);
        Ok(())
    }

    pub async fn remove_service(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (provider_id, mut guard) = self.resolve_entity_write(&id).await?;
        let before = guard.services.len();
        guard.services.retain(|s| s.id != id);
        if guard.services.len() == before {
            return Err(EngineError::NotFound(id));
        }
        self.store.unmap_entity(&id);
        Ok(provider_id)
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Atomically check and insert a booking.
    ///
    /// Under the provider's write lock: reject overlap with an active booking
    /// of the same member (`Conflict`), then require `start` to still be an
    /// offered slot (`SlotUnavailable`), then insert.
    pub async fn create_booking(&self, provider_id: Ulid, req: NewBooking) -> Result<Booking, EngineError> {
        if !req.status.occupies_time() {
            return Err(EngineError::InvalidRecord("new booking must be pending or confirmed"));
        }
        let mut guard = self.write_provider(provider_id).await?;
        if self.get_provider_for_entity(&req.id).is_some() {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many bookings"));
        }
        let service = guard
            .service(&req.service)
            .ok_or(EngineError::NotFound(req.service))?
            .clone();

        let end = req
            .start
            .checked_add_signed(TimeDelta::minutes(Minute::from(service.duration_minutes)))
            .ok_or(EngineError::InvalidRecord("booking start out of range"))?;
        let buffer = Minute::from(service.buffer_minutes);
        let now = self.local_now(guard.provider.timezone);

        if let Err(e) = check_no_conflict(&guard, req.member, req.start, end, buffer) {
            metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => "conflict").increment(1);
            warn!(provider = %provider_id, start = %req.start, "booking rejected: {e}");
            return Err(e);
        }
        if !slot_available(&guard, req.service, req.member, req.location, req.start, now)? {
            metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => "slot_unavailable")
                .increment(1);
            warn!(provider = %provider_id, start = %req.start, "booking rejected: slot not offered");
            return Err(EngineError::SlotUnavailable { start: req.start });
        }

        let booking = Booking {
            id: req.id,
            member: req.member,
            location: req.location,
            service: Some(service.id),
            duration_minutes: service.duration_minutes,
            start: req.start,
            end,
            status: req.status,
        };
        guard.insert_booking(booking.clone());
        self.store.map_entity(booking.id, provider_id);
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(provider = %provider_id, booking = %booking.id, start = %booking.start, "booking created");
        Ok(booking)
    }

    /// Move a booking to `status`. Reactivating a cancelled booking re-runs the
    /// conflict check so it cannot double-book.
    pub async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<Ulid, EngineError> {
        let (provider_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard
            .bookings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        if status.occupies_time() && !booking.status.occupies_time() {
            let buffer = booking
                .service
                .and_then(|sid| guard.service(&sid))
                .map_or(0, |s| Minute::from(s.buffer_minutes));
            check_no_conflict(&guard, booking.member, booking.start, booking.end, buffer)?;
        }

        if let Some(b) = guard.booking_mut(&id) {
            b.status = status;
        }
        info!(provider = %provider_id, booking = %id, ?status, "booking status changed");
        Ok(provider_id)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Ulid, EngineError> {
        self.set_booking_status(id, BookingStatus::Cancelled).await
    }
}
