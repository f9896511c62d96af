use crate::model::Ms;

/// Earliest accepted timestamp (Unix epoch).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// Latest accepted timestamp (9999-12-31T23:59:59.999Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Widest window an availability query may scan.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

/// Longest accepted visitor note, in bytes.
pub const MAX_NOTE_LEN: usize = 2_000;

/// Slot durations outside this range are rejected by the config loader.
pub const MIN_SLOT_DURATION_MS: Ms = 60_000;
pub const MAX_SLOT_DURATION_MS: Ms = 24 * 3_600_000;
