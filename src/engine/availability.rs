use crate::model::*;

// ── Free-window algebra ──────────────────────────────────────────

/// Compute the free sub-windows of `window` for one room: the window minus
/// the merged spans of its active bookings. Cancelled and Completed bookings
/// do not consume availability.
pub fn free_windows(room: &RoomState, window: &Stay, min_nights: Option<i64>) -> Vec<Stay> {
    let mut taken: Vec<Stay> = room
        .overlapping(window)
        .filter(|b| b.is_active())
        .map(|b| {
            Stay::new(
                b.stay.check_in.max(window.check_in),
                b.stay.check_out.min(window.check_out),
            )
        })
        .collect();
    taken.sort_by_key(|s| s.check_in);
    let taken = merge_overlapping(&taken);

    let mut free = subtract_intervals(&[*window], &taken);
    if let Some(n) = min_nights {
        free.retain(|s| s.duration_ms() >= n * MS_PER_NIGHT);
    }
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Stay]) -> Vec<Stay> {
    let mut merged: Vec<Stay> = Vec::new();
    for &stay in sorted {
        if let Some(last) = merged.last_mut()
            && stay.check_in <= last.check_out {
                last.check_out = last.check_out.max(stay.check_out);
                continue;
            }
        merged.push(stay);
    }
    merged
}

/// Subtract `to_remove` (sorted, disjoint) from each interval in `base`.
pub fn subtract_intervals(base: &[Stay], to_remove: &[Stay]) -> Vec<Stay> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.check_in;
        let current_end = b.check_out;

        while ri < to_remove.len() && to_remove[ri].check_out <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].check_in < current_end {
            let r = &to_remove[j];
            if r.check_in > current_start {
                result.push(Stay::new(current_start, r.check_in));
            }
            current_start = current_start.max(r.check_out);
            j += 1;
        }

        if current_start < current_end {
            result.push(Stay::new(current_start, current_end));
        }
    }

    result
}
