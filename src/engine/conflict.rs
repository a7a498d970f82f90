use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), EngineError> {
    if (end - start).num_days() + 1 > MAX_QUERY_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn validate_settings(settings: &BookingSettings) -> Result<(), EngineError> {
    if settings.min_notice_hours > MAX_NOTICE_HOURS {
        return Err(EngineError::LimitExceeded("minimum notice too long"));
    }
    if settings.max_advance_days > MAX_ADVANCE_DAYS {
        return Err(EngineError::LimitExceeded("advance window too long"));
    }
    Ok(())
}

pub(crate) fn validate_rule(rule: &WeeklyRule) -> Result<(), EngineError> {
    if rule.day_of_week > 6 {
        return Err(EngineError::InvalidRecord("day of week out of range"));
    }
    if rule.ranges.len() > MAX_RANGES_PER_RULE {
        return Err(EngineError::LimitExceeded("too many time ranges on rule"));
    }
    if rule.ranges.iter().any(|r| r.to_span().is_none()) {
        return Err(EngineError::InvalidRecord("malformed time range"));
    }
    Ok(())
}

pub(crate) fn validate_block(block: &BlockedSlot) -> Result<(), EngineError> {
    if block.end_date < block.start_date {
        return Err(EngineError::InvalidRecord("block ends before it starts"));
    }
    if !block.all_day && block.time.as_ref().and_then(TimeRange::to_span).is_none() {
        return Err(EngineError::InvalidRecord("partial-day block needs a valid time range"));
    }
    if let Some(ref r) = block.reason
        && r.len() > MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

pub(crate) fn validate_service(service: &Service) -> Result<(), EngineError> {
    if service.duration_minutes == 0 {
        return Err(EngineError::InvalidRecord("service duration must be positive"));
    }
    if service.duration_minutes.saturating_add(service.buffer_minutes) > MAX_SERVICE_MINUTES {
        return Err(EngineError::LimitExceeded("service longer than a day"));
    }
    Ok(())
}

/// Reject `[start, end)` if it collides with an active booking of `member`.
///
/// Both sides carry the trailing buffer: an existing booking's buffer may not
/// be entered, and the new booking's buffer may not run into the next one.
pub(crate) fn check_no_conflict(
    state: &ProviderState,
    member: Option<Ulid>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    buffer: Minute,
) -> Result<(), EngineError> {
    let buffer = TimeDelta::minutes(buffer);
    // Widen the search window to catch:
    // - existing bookings whose end + buffer > start
    // - our end + buffer reaching into the next booking
    // Saturate at the calendar edges.
    let search_start = start.checked_sub_signed(buffer).unwrap_or(NaiveDateTime::MIN);
    let end_with_buffer = end.checked_add_signed(buffer).unwrap_or(NaiveDateTime::MAX);

    for existing in state.bookings_overlapping(search_start, end_with_buffer) {
        if !existing.status.occupies_time() || existing.member != member {
            continue;
        }
        let existing_end_with_buffer = existing
            .end
            .checked_add_signed(buffer)
            .unwrap_or(NaiveDateTime::MAX);
        let existing_blocks = existing.start < end && start < existing_end_with_buffer;
        let ours_blocks = start < existing.end && existing.start < end_with_buffer;
        if existing_blocks || ours_blocks {
            return Err(EngineError::Conflict(existing.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn state_with(bookings: Vec<Booking>) -> ProviderState {
        let mut ps = ProviderState::new(Provider {
            id: Ulid::new(),
            timezone: chrono_tz::UTC,
            settings: BookingSettings::default(),
        });
        for b in bookings {
            ps.insert_booking(b);
        }
        ps
    }

    fn booking(member: Option<Ulid>, start: &str, end: &str, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            member,
            location: Ulid::new(),
            service: None,
            duration_minutes: 30,
            start: dt(start),
            end: dt(end),
            status,
        }
    }

    #[test]
    fn overlapping_booking_conflicts() {
        let b = booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed);
        let id = b.id;
        let ps = state_with(vec![b]);
        let r = check_no_conflict(&ps, None, dt("2026-10-21 10:15"), dt("2026-10-21 10:45"), 0);
        assert_eq!(r, Err(EngineError::Conflict(id)));
    }

    #[test]
    fn back_to_back_without_buffer_is_fine() {
        let ps = state_with(vec![booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed)]);
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 10:30"), dt("2026-10-21 11:00"), 0).is_ok());
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 09:30"), dt("2026-10-21 10:00"), 0).is_ok());
    }

    #[test]
    fn buffer_after_existing_conflicts() {
        let ps = state_with(vec![booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed)]);
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 10:30"), dt("2026-10-21 11:00"), 15).is_err());
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 10:45"), dt("2026-10-21 11:15"), 15).is_ok());
    }

    #[test]
    fn our_buffer_into_next_booking_conflicts() {
        let ps = state_with(vec![booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed)]);
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 09:30"), dt("2026-10-21 10:00"), 15).is_err());
        assert!(check_no_conflict(&ps, None, dt("2026-10-21 09:15"), dt("2026-10-21 09:45"), 15).is_ok());
    }

    #[test]
    fn cancelled_and_other_members_ignored() {
        let alice = Ulid::new();
        let ps = state_with(vec![
            booking(Some(alice), "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Cancelled),
            booking(Some(Ulid::new()), "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed),
        ]);
        assert!(check_no_conflict(&ps, Some(alice), dt("2026-10-21 10:00"), dt("2026-10-21 10:30"), 0).is_ok());
    }

    #[test]
    fn query_window_limit() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert!(validate_range(d(2026, 1, 1), d(2026, 12, 31)).is_ok());
        assert!(validate_range(d(2026, 1, 1), d(2027, 1, 2)).is_err());
    }

    #[test]
    fn rule_validation() {
        let mut rule = WeeklyRule {
            id: Ulid::new(),
            member: None,
            location: Ulid::new(),
            day_of_week: 3,
            ranges: vec![TimeRange::new("09:00", "17:00")],
            open: true,
            effective_from: None,
        };
        assert!(validate_rule(&rule).is_ok());
        rule.day_of_week = 7;
        assert_eq!(validate_rule(&rule), Err(EngineError::InvalidRecord("day of week out of range")));
        rule.day_of_week = 3;
        rule.ranges.push(TimeRange::new("18:00", "17:00"));
        assert!(validate_rule(&rule).is_err());
    }

    #[test]
    fn service_validation() {
        let mut svc = Service {
            id: Ulid::new(),
            name: None,
            duration_minutes: 0,
            buffer_minutes: 0,
            locations: Eligibility::All,
            members: Eligibility::All,
        };
        assert!(validate_service(&svc).is_err());
        svc.duration_minutes = 60;
        assert!(validate_service(&svc).is_ok());
        svc.buffer_minutes = 1_400;
        assert!(validate_service(&svc).is_err());
    }
}
