use chrono::{Days, NaiveDate, NaiveDateTime, TimeDelta};

use crate::model::*;

/// Bookable bounds derived from `now` and the provider's settings.
///
/// A slot is admitted when it starts no earlier than `now + min_notice_hours`
/// and falls on or before the calendar day `now.date() + max_advance_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub earliest: NaiveDateTime,
    pub last_date: NaiveDate,
}

impl BookingWindow {
    pub fn new(now: NaiveDateTime, settings: &BookingSettings) -> Self {
        let earliest = now
            .checked_add_signed(TimeDelta::hours(i64::from(settings.min_notice_hours)))
            .unwrap_or(NaiveDateTime::MAX);
        let last_date = now
            .date()
            .checked_add_days(Days::new(u64::from(settings.max_advance_days)))
            .unwrap_or(NaiveDate::MAX);
        Self { earliest, last_date }
    }

    pub fn admits(&self, slot: &CandidateSlot) -> bool {
        slot.start >= self.earliest && slot.date <= self.last_date
    }

    /// Narrow `[start, end]` to the dates that can hold an admissible slot.
    /// `None` when nothing in the range can pass.
    pub fn clamp_dates(&self, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let from = start.max(self.earliest.date());
        let to = end.min(self.last_date);
        (from <= to).then_some((from, to))
    }
}

/// Drop slots that are in the past, too soon, or too far ahead. Order is preserved.
pub fn filter_by_policy(
    slots: Vec<CandidateSlot>,
    now: NaiveDateTime,
    settings: &BookingSettings,
) -> Vec<CandidateSlot> {
    let window = BookingWindow::new(now, settings);
    slots.into_iter().filter(|s| window.admits(s)).collect()
}
