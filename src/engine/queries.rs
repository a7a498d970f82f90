use std::time::Instant;

use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::validate_range;
use super::policy::{BookingWindow, filter_by_policy};
use super::slots::{ScheduleView, generate_slots};
use super::{Engine, EngineError};

/// Days scanned per step when searching for the first open slot.
const FIRST_AVAILABLE_CHUNK_DAYS: u64 = 14;

/// Locations a query without an explicit location fans out over.
fn candidate_locations(state: &ProviderState, service: &Service) -> Vec<Ulid> {
    match &service.locations {
        Eligibility::Only(set) => set.iter().copied().collect(),
        Eligibility::All => state.scheduled_locations().into_iter().collect(),
    }
}

/// Members the per-member search runs over.
fn candidate_members(state: &ProviderState, service: &Service) -> Vec<Ulid> {
    match &service.members {
        Eligibility::Only(set) => set.iter().copied().collect(),
        Eligibility::All => state.scheduled_members().into_iter().collect(),
    }
}

/// Slots for `query` against `state`, pruned by the provider's booking policy.
pub(super) fn available_slots(
    state: &ProviderState,
    query: &SlotQuery,
    now: NaiveDateTime,
) -> Result<Vec<CandidateSlot>, EngineError> {
    if query.start_date > query.end_date {
        return Ok(Vec::new());
    }
    validate_range(query.start_date, query.end_date)?;
    let service = state
        .service(&query.service)
        .ok_or(EngineError::NotFound(query.service))?;

    let settings = &state.provider.settings;
    let window = BookingWindow::new(now, settings);
    let Some((from, to)) = window.clamp_dates(query.start_date, query.end_date) else {
        return Ok(Vec::new());
    };

    let locations = match query.location {
        Some(location) => vec![location],
        None => candidate_locations(state, service),
    };

    let view = ScheduleView::of(state);
    let mut slots = Vec::new();
    for &location in &locations {
        slots.extend(generate_slots(&view, service, query.member, location, from, to));
    }
    if locations.len() > 1 {
        slots.sort_by_key(|s| (s.start, s.location));
    }
    Ok(filter_by_policy(slots, now, settings))
}

/// Whether `at` is exactly the start of an offered slot.
pub(super) fn slot_available(
    state: &ProviderState,
    service: Ulid,
    member: Option<Ulid>,
    location: Ulid,
    at: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<bool, EngineError> {
    let query = SlotQuery {
        service,
        member,
        location: Some(location),
        start_date: at.date(),
        end_date: at.date(),
    };
    Ok(available_slots(state, &query, now)?
        .iter()
        .any(|s| s.start == at))
}

/// Earliest slot between today and the provider's advance horizon.
pub(super) fn first_available(
    state: &ProviderState,
    service: Ulid,
    member: Option<Ulid>,
    location: Option<Ulid>,
    now: NaiveDateTime,
) -> Result<Option<CandidateSlot>, EngineError> {
    let window = BookingWindow::new(now, &state.provider.settings);
    let today = now.date();
    let max_span = Days::new((MAX_QUERY_DAYS - 1) as u64);
    let horizon = today
        .checked_add_days(max_span)
        .map_or(window.last_date, |d| d.min(window.last_date));

    let mut from = today;
    while from <= horizon {
        let to = from
            .checked_add_days(Days::new(FIRST_AVAILABLE_CHUNK_DAYS - 1))
            .map_or(horizon, |d| d.min(horizon));
        let query = SlotQuery {
            service,
            member,
            location,
            start_date: from,
            end_date: to,
        };
        if let Some(first) = available_slots(state, &query, now)?.into_iter().next() {
            return Ok(Some(first));
        }
        let Some(next) = to.succ_opt() else { break };
        from = next;
    }
    Ok(None)
}

impl Engine {
    /// Bookable slots for a provider's service over an inclusive date range.
    ///
    /// Without a location the query fans out over every eligible location and
    /// the merged result stays in `(start, location)` order. Without a member
    /// the provider's own schedule is used.
    pub async fn get_available_slots(
        &self,
        provider_id: Ulid,
        query: SlotQuery,
    ) -> Result<Vec<CandidateSlot>, EngineError> {
        let started = Instant::now();
        let result = async {
            let guard = self.read_provider(provider_id).await?;
            let now = self.local_now(guard.provider.timezone);
            available_slots(&guard, &query, now)
        }
        .await;

        observability::record_query("get_available_slots", &result, started);
        if let Ok(slots) = &result {
            metrics::histogram!(observability::SLOTS_RETURNED).record(slots.len() as f64);
            debug!(
                provider = %provider_id,
                service = %query.service,
                from = %query.start_date,
                to = %query.end_date,
                slots = slots.len(),
                "slot query"
            );
        }
        result
    }

    /// Whether `at` is currently offered for this service, member and location.
    pub async fn is_slot_available(
        &self,
        provider_id: Ulid,
        service: Ulid,
        member: Option<Ulid>,
        location: Ulid,
        at: NaiveDateTime,
    ) -> Result<bool, EngineError> {
        let started = Instant::now();
        let result = async {
            let guard = self.read_provider(provider_id).await?;
            let now = self.local_now(guard.provider.timezone);
            slot_available(&guard, service, member, location, at, now)
        }
        .await;
        observability::record_query("is_slot_available", &result, started);
        result
    }

    /// Earliest bookable slot from now on, or `None` within the advance window.
    pub async fn first_available(
        &self,
        provider_id: Ulid,
        service: Ulid,
        member: Option<Ulid>,
        location: Option<Ulid>,
    ) -> Result<Option<CandidateSlot>, EngineError> {
        let started = Instant::now();
        let result = async {
            let guard = self.read_provider(provider_id).await?;
            let now = self.local_now(guard.provider.timezone);
            first_available(&guard, service, member, location, now)
        }
        .await;
        observability::record_query("first_available", &result, started);
        result
    }

    /// First slot per eligible member, soonest first; members with nothing
    /// available come last.
    pub async fn next_available_per_member(
        &self,
        provider_id: Ulid,
        service: Ulid,
        location: Option<Ulid>,
    ) -> Result<Vec<(Ulid, Option<CandidateSlot>)>, EngineError> {
        let started = Instant::now();
        let result = async {
            let guard = self.read_provider(provider_id).await?;
            let now = self.local_now(guard.provider.timezone);
            let svc = guard.service(&service).ok_or(EngineError::NotFound(service))?;

            let mut per_member = Vec::new();
            for member in candidate_members(&guard, svc) {
                let first = first_available(&guard, service, Some(member), location, now)?;
                per_member.push((member, first));
            }
            per_member.sort_by_key(|(member, slot)| {
                (slot.is_none(), slot.as_ref().map(|s| s.start), *member)
            });
            Ok::<_, EngineError>(per_member)
        }
        .await;
        observability::record_query("next_available_per_member", &result, started);
        result
    }

    pub async fn bookings(&self, provider_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let guard = self.read_provider(provider_id).await?;
        Ok(guard.bookings.clone())
    }

    /// Bookings of a provider that start on `date`.
    pub async fn bookings_on(&self, provider_id: Ulid, date: NaiveDate) -> Result<Vec<Booking>, EngineError> {
        let guard = self.read_provider(provider_id).await?;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| b.start.date() == date)
            .cloned()
            .collect())
    }

    pub async fn snapshot(&self, provider_id: Ulid) -> Result<ProviderSnapshot, EngineError> {
        let guard = self.read_provider(provider_id).await?;
        Ok(guard.to_snapshot())
    }
}
