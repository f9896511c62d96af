use crate::limits::MAX_QUERY_WINDOW_MS;
use crate::model::*;

use super::EngineError;
use super::conflict::{StatusFilter, has_conflict};

// ── Slot Generation ───────────────────────────────────────────────

/// Back-to-back slots of `slot_ms` starting at `window.start` that end at or
/// before `window.end`. Lazy and restartable: call again for a fresh pass.
pub fn candidate_slots(window: Span, slot_ms: Ms) -> impl Iterator<Item = Span> {
    let first = (slot_ms > 0)
        .then(|| window.start.checked_add(slot_ms))
        .flatten()
        .filter(|end| *end <= window.end)
        .map(|end| Span::new(window.start, end));
    std::iter::successors(first, move |prev| {
        let end = prev.end.checked_add(slot_ms)?;
        (end <= window.end).then(|| Span::new(prev.end, end))
    })
}

/// Free slots in `[window_start, window_end)`, chronological.
///
/// A slot is free when it overlaps no Pending or Confirmed appointment in
/// `snapshot` and starts strictly after `now`.
pub fn available_slots(
    snapshot: &ListingSnapshot,
    window_start: Ms,
    window_end: Ms,
    slot_ms: Ms,
    now: Ms,
) -> Result<Vec<Span>, EngineError> {
    if window_end <= window_start {
        return Err(EngineError::InvalidWindow {
            start: window_start,
            end: window_end,
        });
    }
    window_end
        .checked_sub(window_start)
        .filter(|width| *width <= MAX_QUERY_WINDOW_MS)
        .ok_or(EngineError::LimitExceeded("availability window too wide"))?;
    let window = Span::new(window_start, window_end);
    Ok(candidate_slots(window, slot_ms)
        .filter(|slot| slot.start > now)
        .filter(|slot| !has_conflict(snapshot, slot, None, StatusFilter::Active))
        .collect())
}
