use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes; the only intra-day time unit.
pub type Minute = i64;

pub const MINUTES_PER_DAY: Minute = 1_440;

/// Half-open interval `[start, end)`.
///
/// Call sites use it either relative to a local midnight (`0..=1440`) or as
/// minutes on a wider axis; the algorithms don't care which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` for empty or inverted input instead of a malformed span.
    pub fn checked(start: Minute, end: Minute) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Span covering a whole local day.
    pub fn full_day() -> Self {
        Self::new(0, MINUTES_PER_DAY)
    }
}

/// Parse `"HH:MM"` into minutes after midnight. `"24:00"` is accepted as end of day.
pub fn parse_time_of_day(s: &str) -> Option<Minute> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: Minute = h.parse().ok()?;
    let m: Minute = m.parse().ok()?;
    match (h, m) {
        (24, 0) => Some(MINUTES_PER_DAY),
        (0..=23, 0..=59) => Some(h * 60 + m),
        _ => None,
    }
}

/// Local midnight of `date`.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Local datetime `minute` minutes after midnight of `date` (may roll into the next day).
pub fn at_minute(date: NaiveDate, minute: Minute) -> NaiveDateTime {
    day_start(date) + TimeDelta::minutes(minute)
}

/// Minutes from midnight of `date` to `dt`; negative before that midnight.
pub fn minutes_since_day_start(date: NaiveDate, dt: NaiveDateTime) -> Minute {
    (dt - day_start(date)).num_minutes()
}

// ── Scoping ─────────────────────────────────────────────────────

/// Who or where a blocked period applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    All,
    Specific(Ulid),
}

impl Scope {
    pub fn matches(&self, requested: Option<Ulid>) -> bool {
        match self {
            Scope::All => true,
            Scope::Specific(id) => requested == Some(*id),
        }
    }
}

/// Which members or locations may deliver a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    #[default]
    All,
    Only(BTreeSet<Ulid>),
}

impl Eligibility {
    pub fn allows(&self, id: Option<Ulid>) -> bool {
        match self {
            Eligibility::All => true,
            Eligibility::Only(set) => id.is_some_and(|i| set.contains(&i)),
        }
    }
}

// ── Input records ───────────────────────────────────────────────

/// A raw `"HH:MM"` to `"HH:MM"` pair as stored by the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    /// Minute span for this range, or `None` if either side is malformed or empty.
    pub fn to_span(&self) -> Option<Span> {
        Span::checked(parse_time_of_day(&self.start)?, parse_time_of_day(&self.end)?)
    }
}

/// Recurring opening hours for one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    pub id: Ulid,
    /// `None` = applies to the provider as a whole.
    #[serde(default)]
    pub member: Option<Ulid>,
    pub location: Ulid,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    #[serde(default)]
    pub ranges: Vec<TimeRange>,
    pub open: bool,
    /// Set on scheduled future changes; `None` is the baseline.
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
}

/// Ad-hoc time off: vacation, personal time, closures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSlot {
    pub id: Ulid,
    pub member: Scope,
    pub location: Scope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub all_day: bool,
    /// Only meaningful when `all_day` is false.
    #[serde(default)]
    pub time: Option<TimeRange>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    #[serde(default)]
    pub name: Option<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub buffer_minutes: u32,
    #[serde(default)]
    pub locations: Eligibility,
    #[serde(default)]
    pub members: Eligibility,
}

impl Service {
    /// Distance between consecutive slot starts: duration plus trailing buffer.
    pub fn step(&self) -> Minute {
        Minute::from(self.duration_minutes) + Minute::from(self.buffer_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Only pending and confirmed bookings hold time.
    pub fn occupies_time(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    #[serde(default)]
    pub member: Option<Ulid>,
    pub location: Ulid,
    #[serde(default)]
    pub service: Option<Ulid>,
    pub duration_minutes: u32,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSettings {
    #[serde(default)]
    pub min_notice_hours: u32,
    #[serde(default = "default_max_advance_days")]
    pub max_advance_days: u32,
}

fn default_max_advance_days() -> u32 {
    365
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            min_notice_hours: 0,
            max_advance_days: default_max_advance_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Ulid,
    pub timezone: Tz,
    #[serde(default)]
    pub settings: BookingSettings,
}

/// Everything the engine needs about one provider, as fetched by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub provider: Provider,
    #[serde(default)]
    pub rules: Vec<WeeklyRule>,
    #[serde(default)]
    pub blocked: Vec<BlockedSlot>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub bookings: Vec<Booking>,
}

// ── Output ───────────────────────────────────────────────────────

/// A bookable start/end for one service, member and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub member: Option<Ulid>,
    pub location: Ulid,
}

impl CandidateSlot {
    pub fn from_day_span(date: NaiveDate, span: Span, member: Option<Ulid>, location: Ulid) -> Self {
        let start = at_minute(date, span.start);
        let end = at_minute(date, span.end);
        Self {
            date,
            start_time: start.time(),
            end_time: end.time(),
            start,
            end,
            member,
            location,
        }
    }
}

/// Selector for a slot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    pub service: Ulid,
    pub member: Option<Ulid>,
    pub location: Option<Ulid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Booking request handed to the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub id: Ulid,
    pub service: Ulid,
    pub member: Option<Ulid>,
    pub location: Ulid,
    pub start: NaiveDateTime,
    pub status: BookingStatus,
}

// ── Provider state ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProviderState {
    pub provider: Provider,
    pub rules: Vec<WeeklyRule>,
    pub blocked: Vec<BlockedSlot>,
    pub services: Vec<Service>,
    /// Sorted by `start`.
    pub bookings: Vec<Booking>,
}

impl ProviderState {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            rules: Vec::new(),
            blocked: Vec::new(),
            services: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: ProviderSnapshot) -> Self {
        let mut bookings = snapshot.bookings;
        bookings.sort_by_key(|b| b.start);
        Self {
            provider: snapshot.provider,
            rules: snapshot.rules,
            blocked: snapshot.blocked,
            services: snapshot.services,
            bookings,
        }
    }

    pub fn to_snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            provider: self.provider.clone(),
            rules: self.rules.clone(),
            blocked: self.blocked.clone(),
            services: self.services.clone(),
            bookings: self.bookings.clone(),
        }
    }

    pub fn service(&self, id: &Ulid) -> Option<&Service> {
        self.services.iter().find(|s| s.id == *id)
    }

    /// Insert booking maintaining sort order by start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self.bookings.partition_point(|b| b.start <= booking.start);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Bookings whose `[start, end)` overlaps `[from, to)`.
    /// Uses binary search to skip bookings starting at or after `to`.
    pub fn bookings_overlapping(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start < to);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end > from)
    }

    /// Every member referenced by a rule, in id order.
    pub fn scheduled_members(&self) -> BTreeSet<Ulid> {
        self.rules.iter().filter_map(|r| r.member).collect()
    }

    /// Every location referenced by a rule, in id order.
    pub fn scheduled_locations(&self) -> BTreeSet<Ulid> {
        self.rules.iter().map(|r| r.location).collect()
    }
}
