// Hard limits. Everything the engine accepts from a caller is bounded here.

/// Widest date range a single slot query may cover (inclusive days).
pub const MAX_QUERY_DAYS: i64 = 366;

pub const MAX_PROVIDERS: usize = 100_000;
pub const MAX_RULES_PER_PROVIDER: usize = 5_000;
pub const MAX_BLOCKED_PER_PROVIDER: usize = 10_000;
pub const MAX_SERVICES_PER_PROVIDER: usize = 1_000;
pub const MAX_BOOKINGS_PER_PROVIDER: usize = 500_000;

/// Time ranges on a single weekly rule.
pub const MAX_RANGES_PER_RULE: usize = 48;

pub const MAX_REASON_LEN: usize = 1_024;

/// Service duration + buffer may not exceed one day.
pub const MAX_SERVICE_MINUTES: u32 = 1_440;

/// Booking-policy ceilings.
pub const MAX_NOTICE_HOURS: u32 = 24 * 365;
pub const MAX_ADVANCE_DAYS: u32 = 3 * 365;
