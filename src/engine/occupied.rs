use chrono::{NaiveDate, TimeDelta};
use ulid::Ulid;

use crate::model::*;

use super::interval::merge;

/// Intervals of `date` held by active bookings of `member`, each extended by
/// `buffer` minutes on its trailing edge. Minutes are relative to local
/// midnight and may fall outside `0..1440` for bookings that cross midnight.
///
/// `bookings` must be sorted by start.
///
/// A booking blocks its member regardless of location; the same person cannot
/// serve two places at once.
pub fn resolve_occupied(
    bookings: &[Booking],
    date: NaiveDate,
    member: Option<Ulid>,
    buffer: Minute,
) -> Vec<Span> {
    let from = day_start(date) - TimeDelta::minutes(buffer);
    let to = day_start(date) + TimeDelta::days(1);
    let right_bound = bookings.partition_point(|b| b.start < to);

    let spans: Vec<Span> = bookings[..right_bound]
        .iter()
        .filter(|b| b.end > from)
        .filter(|b| b.status.occupies_time() && b.member == member)
        .filter_map(|b| {
            Span::checked(
                minutes_since_day_start(date, b.start),
                minutes_since_day_start(date, b.end) + buffer,
            )
        })
        .collect();
    merge(&spans)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
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
    fn confirmed_booking_with_buffer() {
        let bookings = vec![booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed)];
        assert_eq!(resolve_occupied(&bookings, date(21), None, 15), vec![Span::new(600, 645)]);
    }

    #[test]
    fn inactive_statuses_do_not_occupy() {
        let bookings = vec![
            booking(None, "2026-10-21 09:00", "2026-10-21 09:30", BookingStatus::Cancelled),
            booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Completed),
            booking(None, "2026-10-21 11:00", "2026-10-21 11:30", BookingStatus::NoShow),
            booking(None, "2026-10-21 12:00", "2026-10-21 12:30", BookingStatus::Pending),
        ];
        assert_eq!(resolve_occupied(&bookings, date(21), None, 0), vec![Span::new(720, 750)]);
    }

    #[test]
    fn other_days_and_members_ignored() {
        let alice = Ulid::new();
        let bookings = vec![
            booking(Some(alice), "2026-10-20 10:00", "2026-10-20 11:00", BookingStatus::Confirmed),
            booking(Some(Ulid::new()), "2026-10-21 10:00", "2026-10-21 11:00", BookingStatus::Confirmed),
            booking(Some(alice), "2026-10-21 14:00", "2026-10-21 15:00", BookingStatus::Confirmed),
            booking(Some(alice), "2026-10-22 10:00", "2026-10-22 11:00", BookingStatus::Confirmed),
        ];
        assert_eq!(
            resolve_occupied(&bookings, date(21), Some(alice), 0),
            vec![Span::new(840, 900)]
        );
    }

    #[test]
    fn booking_from_previous_evening_spills_over() {
        let bookings = vec![booking(None, "2026-10-20 23:30", "2026-10-21 00:30", BookingStatus::Confirmed)];
        assert_eq!(resolve_occupied(&bookings, date(21), None, 15), vec![Span::new(-30, 45)]);
    }

    #[test]
    fn buffer_alone_reaches_into_next_day() {
        let bookings = vec![booking(None, "2026-10-20 23:00", "2026-10-21 00:00", BookingStatus::Confirmed)];
        assert_eq!(resolve_occupied(&bookings, date(21), None, 20), vec![Span::new(-60, 20)]);
        assert!(resolve_occupied(&bookings, date(21), None, 0).is_empty());
    }

    #[test]
    fn back_to_back_bookings_merge() {
        let bookings = vec![
            booking(None, "2026-10-21 10:00", "2026-10-21 10:30", BookingStatus::Confirmed),
            booking(None, "2026-10-21 10:30", "2026-10-21 11:00", BookingStatus::Confirmed),
        ];
        assert_eq!(resolve_occupied(&bookings, date(21), None, 0), vec![Span::new(600, 660)]);
    }

    #[test]
    fn inverted_booking_is_skipped() {
        let bookings = vec![booking(None, "2026-10-21 11:00", "2026-10-21 10:00", BookingStatus::Confirmed)];
        assert!(resolve_occupied(&bookings, date(21), None, 0).is_empty());
    }
}
