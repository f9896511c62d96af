use std::path::PathBuf;

use tracing::warn;

use crate::limits::{MAX_SLOT_DURATION_MS, MIN_SLOT_DURATION_MS};
use crate::model::Ms;

pub const DEFAULT_SLOT_MINUTES: i64 = 60;
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

/// Engine-facing knobs. Everything else in [`Settings`] is process wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of every viewing slot.
    pub slot_duration_ms: Ms,
    /// When true, a new request only conflicts with confirmed appointments;
    /// overlapping pending requests are resolved by the confirm cascade.
    pub pending_may_overlap: bool,
    /// Compare-and-commit attempts before a write gives up with `SlotUnavailable`.
    pub max_commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_duration_ms: DEFAULT_SLOT_MINUTES * 60_000,
            pending_may_overlap: false,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Replace out-of-range values with their defaults, logging each one.
    /// The engine applies this to whatever config it is handed.
    pub fn sanitized(mut self) -> Self {
        if !(MIN_SLOT_DURATION_MS..=MAX_SLOT_DURATION_MS).contains(&self.slot_duration_ms) {
            warn!(
                "slot duration {}ms out of range, using {DEFAULT_SLOT_MINUTES} min",
                self.slot_duration_ms
            );
            self.slot_duration_ms = DEFAULT_SLOT_MINUTES * 60_000;
        }
        if self.max_commit_attempts == 0 {
            warn!("max_commit_attempts=0, using {DEFAULT_MAX_COMMIT_ATTEMPTS}");
            self.max_commit_attempts = DEFAULT_MAX_COMMIT_ATTEMPTS;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl Settings {
    /// Read `VIEWSLOT_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("VIEWSLOT_DATA_DIR").unwrap_or_else(|| "./data".into());
        let compact_threshold: u64 = lookup("VIEWSLOT_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let metrics_port: Option<u16> = lookup("VIEWSLOT_METRICS_PORT").and_then(|s| s.parse().ok());

        let slot_minutes: i64 = lookup("VIEWSLOT_SLOT_MINUTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SLOT_MINUTES);
        let slot_duration_ms = slot_minutes.saturating_mul(60_000);

        let pending_may_overlap = lookup("VIEWSLOT_PENDING_MAY_OVERLAP")
            .is_some_and(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"));
        let max_commit_attempts: u32 = lookup("VIEWSLOT_MAX_COMMIT_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_COMMIT_ATTEMPTS);

        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
            engine: EngineConfig {
                slot_duration_ms,
                pending_may_overlap,
                max_commit_attempts,
            }
            .sanitized(),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }
}
