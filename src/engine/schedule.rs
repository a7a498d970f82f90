use chrono::{Datelike, NaiveDate};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::interval::intersect;

// ── Weekly schedule resolution ───────────────────────────────────

/// Rules for `(member, location)` on `date`'s weekday that are already in force.
///
/// Member rules override per day: if the member has a rule in force for this
/// weekday at this location, only the member's rules count; otherwise the
/// provider-wide rules (member `None`) for that weekday apply.
fn rules_in_force(
    rules: &[WeeklyRule],
    date: NaiveDate,
    member: Option<Ulid>,
    location: Ulid,
) -> Vec<&WeeklyRule> {
    let own = rules_of(rules, date, member, location);
    if !own.is_empty() || member.is_none() {
        return own;
    }
    rules_of(rules, date, None, location)
}

fn rules_of(
    rules: &[WeeklyRule],
    date: NaiveDate,
    who: Option<Ulid>,
    location: Ulid,
) -> Vec<&WeeklyRule> {
    let dow = date.weekday().num_days_from_sunday() as u8;
    rules
        .iter()
        .filter(|r| r.location == location && r.member == who && r.day_of_week == dow)
        .filter(|r| r.effective_from.is_none_or(|from| from <= date))
        .collect()
}

/// The rule in force on `date`: the latest `effective_from` that is not after
/// `date`, with the baseline (no `effective_from`) ranking below every dated
/// change. Ties on the same effective date resolve to the highest id.
pub fn active_rule(
    rules: &[WeeklyRule],
    date: NaiveDate,
    member: Option<Ulid>,
    location: Ulid,
) -> Option<&WeeklyRule> {
    let mut candidates = rules_in_force(rules, date, member, location);
    // None < Some(_), so baselines sort first.
    candidates.sort_by_key(|r| (r.effective_from, r.id));
    candidates.last().copied()
}

/// Open intervals for `date`, in minutes after local midnight, sorted and disjoint.
pub fn resolve_open(
    rules: &[WeeklyRule],
    date: NaiveDate,
    member: Option<Ulid>,
    location: Ulid,
) -> Vec<Span> {
    let Some(rule) = active_rule(rules, date, member, location) else {
        return Vec::new();
    };
    if !rule.open {
        return Vec::new();
    }

    let mut spans = Vec::with_capacity(rule.ranges.len());
    for range in &rule.ranges {
        match range.to_span() {
            Some(span) => spans.push(span),
            None => warn!(
                rule = %rule.id,
                start = %range.start,
                end = %range.end,
                "ignoring malformed time range"
            ),
        }
    }
    intersect(&spans, &[Span::full_day()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONDAY: u8 = 1;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(
        member: Option<Ulid>,
        location: Ulid,
        day_of_week: u8,
        ranges: &[(&str, &str)],
        open: bool,
        effective_from: Option<NaiveDate>,
    ) -> WeeklyRule {
        WeeklyRule {
            id: Ulid::new(),
            member,
            location,
            day_of_week,
            ranges: ranges.iter().map(|(s, e)| TimeRange::new(s, e)).collect(),
            open,
            effective_from,
        }
    }

    fn hours(start: Minute, end: Minute) -> Span {
        Span::new(start * 60, end * 60)
    }

    // 2026-10-19 is a Monday.

    #[test]
    fn baseline_rule_applies() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None)];
        assert_eq!(resolve_open(&rules, date(2026, 10, 19), None, loc), vec![hours(9, 17)]);
        // Tuesday has no rule.
        assert!(resolve_open(&rules, date(2026, 10, 20), None, loc).is_empty());
    }

    #[test]
    fn sunday_is_day_zero() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, 0, &[("10:00", "14:00")], true, None)];
        assert_eq!(resolve_open(&rules, date(2026, 10, 25), None, loc), vec![hours(10, 14)]);
    }

    #[test]
    fn closed_rule_yields_nothing() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("09:00", "17:00")], false, None)];
        assert!(resolve_open(&rules, date(2026, 10, 19), None, loc).is_empty());
    }

    #[test]
    fn future_override_takes_effect_on_its_date() {
        let loc = Ulid::new();
        let effective = date(2026, 11, 2);
        let rules = vec![
            rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None),
            rule(None, loc, MONDAY, &[], false, Some(effective)),
        ];
        assert_eq!(resolve_open(&rules, date(2026, 10, 26), None, loc), vec![hours(9, 17)]);
        assert!(resolve_open(&rules, date(2026, 11, 2), None, loc).is_empty());
        assert!(resolve_open(&rules, date(2026, 11, 9), None, loc).is_empty());
    }

    #[test]
    fn chained_changes_pick_closest_past_date() {
        let loc = Ulid::new();
        let summer = date(2026, 6, 1);
        let winter = date(2026, 10, 1);
        // Deliberately out of order.
        let rules = vec![
            rule(None, loc, MONDAY, &[("08:00", "12:00")], true, Some(winter)),
            rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None),
            rule(None, loc, MONDAY, &[("07:00", "19:00")], true, Some(summer)),
        ];
        assert_eq!(resolve_open(&rules, date(2026, 5, 25), None, loc), vec![hours(9, 17)]);
        assert_eq!(resolve_open(&rules, date(2026, 6, 1), None, loc), vec![hours(7, 19)]);
        assert_eq!(resolve_open(&rules, date(2026, 9, 28), None, loc), vec![hours(7, 19)]);
        assert_eq!(resolve_open(&rules, date(2026, 10, 5), None, loc), vec![hours(8, 12)]);
    }

    #[test]
    fn only_future_overrides_means_closed_until_then() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("09:00", "17:00")], true, Some(date(2026, 11, 2)))];
        assert!(resolve_open(&rules, date(2026, 10, 26), None, loc).is_empty());
        assert_eq!(resolve_open(&rules, date(2026, 11, 2), None, loc), vec![hours(9, 17)]);
    }

    #[test]
    fn malformed_ranges_are_dropped() {
        let loc = Ulid::new();
        let rules = vec![rule(
            None,
            loc,
            MONDAY,
            &[("09:00", "12:00"), ("14:00", "13:00"), ("garbage", "15:00"), ("15:00", "18:00")],
            true,
            None,
        )];
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 19), None, loc),
            vec![hours(9, 12), hours(15, 18)]
        );
    }

    #[test]
    fn overlapping_ranges_are_merged() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("13:00", "18:00"), ("09:00", "14:00")], true, None)];
        assert_eq!(resolve_open(&rules, date(2026, 10, 19), None, loc), vec![hours(9, 18)]);
    }

    #[test]
    fn other_location_does_not_apply() {
        let loc = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None)];
        assert!(resolve_open(&rules, date(2026, 10, 19), None, Ulid::new()).is_empty());
    }

    #[test]
    fn member_without_rules_inherits_provider_schedule() {
        let loc = Ulid::new();
        let member = Ulid::new();
        let rules = vec![rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None)];
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 19), Some(member), loc),
            vec![hours(9, 17)]
        );
    }

    #[test]
    fn member_rules_override_provider_schedule_per_day() {
        let loc = Ulid::new();
        let member = Ulid::new();
        let rules = vec![
            rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None),
            rule(None, loc, 2, &[("09:00", "17:00")], true, None),
            rule(Some(member), loc, MONDAY, &[("12:00", "16:00")], true, None),
        ];
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 19), Some(member), loc),
            vec![hours(12, 16)]
        );
        // No member rule for Tuesday, so the provider's Tuesday is inherited.
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 20), Some(member), loc),
            vec![hours(9, 17)]
        );
    }

    #[test]
    fn member_closed_rule_overrides_provider_day() {
        let loc = Ulid::new();
        let member = Ulid::new();
        let rules = vec![
            rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None),
            rule(Some(member), loc, MONDAY, &[], false, None),
        ];
        assert!(resolve_open(&rules, date(2026, 10, 19), Some(member), loc).is_empty());
    }

    #[test]
    fn member_future_change_keeps_inherited_days_until_effective() {
        let loc = Ulid::new();
        let member = Ulid::new();
        let switch = date(2026, 11, 2);
        let rules = vec![
            rule(None, loc, MONDAY, &[("09:00", "17:00")], true, None),
            rule(None, loc, 2, &[("09:00", "17:00")], true, None),
            rule(Some(member), loc, MONDAY, &[("10:00", "12:00")], true, Some(switch)),
        ];
        // Before the change the member still works the provider's hours.
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 26), Some(member), loc),
            vec![hours(9, 17)]
        );
        assert_eq!(
            resolve_open(&rules, date(2026, 10, 27), Some(member), loc),
            vec![hours(9, 17)]
        );
        assert_eq!(resolve_open(&rules, switch, Some(member), loc), vec![hours(10, 12)]);
        assert_eq!(
            resolve_open(&rules, date(2026, 11, 3), Some(member), loc),
            vec![hours(9, 17)]
        );
    }

    #[test]
    fn provider_query_ignores_member_rules() {
        let loc = Ulid::new();
        let rules = vec![rule(Some(Ulid::new()), loc, MONDAY, &[("09:00", "17:00")], true, None)];
        assert!(resolve_open(&rules, date(2026, 10, 19), None, loc).is_empty());
    }
}
