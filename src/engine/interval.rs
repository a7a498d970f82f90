use crate::model::*;

// ── Interval algebra ─────────────────────────────────────────────

/// Sort, drop empties, and coalesce touching or overlapping spans.
pub fn merge(spans: &[Span]) -> Vec<Span> {
    let mut sorted: Vec<Span> = spans.iter().copied().filter(|s| s.start < s.end).collect();
    sorted.sort_by_key(|s| s.start);
    merge_overlapping(&sorted)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `free` minus every span in `busy`. Inputs need not be sorted or disjoint.
pub fn subtract(free: &[Span], busy: &[Span]) -> Vec<Span> {
    subtract_intervals(&merge(free), &merge(busy))
}

/// Sweep subtraction over sorted, disjoint inputs.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Spans covered by both `a` and `b`.
pub fn intersect(a: &[Span], b: &[Span]) -> Vec<Span> {
    let a = merge(a);
    let b = merge(b);
    let (mut i, mut j) = (0, 0);
    let mut result = Vec::new();

    while i < a.len() && j < b.len() {
        if let Some(s) = Span::checked(a[i].start.max(b[j].start), a[i].end.min(b[j].end)) {
            result.push(s);
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }

    result
}
