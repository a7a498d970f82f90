use chrono::NaiveDate;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::interval::merge;

/// Whether `block` covers `date` for this member and location.
pub fn applies(block: &BlockedSlot, date: NaiveDate, member: Option<Ulid>, location: Ulid) -> bool {
    block.start_date <= date
        && date <= block.end_date
        && block.member.matches(member)
        && block.location.matches(Some(location))
}

/// Blocked intervals for `date`, in minutes after local midnight. All matching
/// blocks apply; the result is merged.
pub fn resolve_blocked(
    blocks: &[BlockedSlot],
    date: NaiveDate,
    member: Option<Ulid>,
    location: Ulid,
) -> Vec<Span> {
    let mut spans = Vec::new();
    for block in blocks.iter().filter(|b| applies(b, date, member, location)) {
        if block.all_day {
            spans.push(Span::full_day());
            continue;
        }
        match block.time.as_ref().and_then(TimeRange::to_span) {
            Some(span) => spans.push(span),
            None => warn!(block = %block.id, "ignoring partial-day block without a valid time range"),
        }
    }
    merge(&spans)
}
