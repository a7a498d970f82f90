use chrono::NaiveDate;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::blocked::resolve_blocked;
use super::interval::subtract;
use super::occupied::resolve_occupied;
use super::schedule::resolve_open;

/// Borrowed view of the records a slot search reads.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleView<'a> {
    pub rules: &'a [WeeklyRule],
    pub blocked: &'a [BlockedSlot],
    /// Sorted by start.
    pub bookings: &'a [Booking],
}

impl<'a> ScheduleView<'a> {
    pub fn of(state: &'a ProviderState) -> Self {
        Self {
            rules: &state.rules,
            blocked: &state.blocked,
            bookings: &state.bookings,
        }
    }
}

// ── Slot generation ──────────────────────────────────────────────

/// Free intervals for one day: open hours minus blocked and occupied time.
pub fn free_intervals(
    view: &ScheduleView<'_>,
    service: &Service,
    date: NaiveDate,
    member: Option<Ulid>,
    location: Ulid,
) -> Vec<Span> {
    let open = resolve_open(view.rules, date, member, location);
    if open.is_empty() {
        return open;
    }
    let mut unavailable = resolve_blocked(view.blocked, date, member, location);
    unavailable.extend(resolve_occupied(
        view.bookings,
        date,
        member,
        Minute::from(service.buffer_minutes),
    ));
    subtract(&open, &unavailable)
}

/// Walk each free span left to right in steps of `step`, emitting a
/// `duration`-long slot wherever the whole step still fits.
pub fn walk_free(free: &[Span], duration: Minute, step: Minute) -> Vec<Span> {
    if duration <= 0 || step < duration {
        return Vec::new();
    }
    let mut out = Vec::new();
    for span in free.iter().filter(|s| s.duration() >= step) {
        let mut t = span.start;
        while t + step <= span.end {
            out.push(Span::new(t, t + duration));
            t += step;
        }
    }
    out
}

/// Bookable slots for `service` delivered by `member` at `location`, for every
/// date in `[start_date, end_date]`, in ascending chronological order.
///
/// Ineligible member/location combinations yield an empty sequence.
pub fn generate_slots(
    view: &ScheduleView<'_>,
    service: &Service,
    member: Option<Ulid>,
    location: Ulid,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<CandidateSlot> {
    if !service.members.allows(member) || !service.locations.allows(Some(location)) {
        return Vec::new();
    }
    if service.duration_minutes == 0 {
        warn!(service = %service.id, "service has zero duration, no slots");
        return Vec::new();
    }

    let duration = Minute::from(service.duration_minutes);
    let step = service.step();
    let mut slots = Vec::new();

    for date in start_date.iter_days().take_while(|d| *d <= end_date) {
        let free = free_intervals(view, service, date, member, location);
        slots.extend(
            walk_free(&free, duration, step)
                .into_iter()
                .map(|span| CandidateSlot::from_day_span(date, span, member, location)),
        );
    }
    slots
}
