mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{available_slots, candidate_slots};
pub use conflict::{StatusFilter, conflicts, has_conflict};
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::directory::ListingDirectory;
use crate::locks::KeyedLocks;
use crate::model::*;
use crate::notify::EventSink;
use crate::store::{AppointmentStore, StoreError};

/// The booking coordinator. Owns every appointment write.
///
/// Writes on one listing are serialized twice over: by an in-process lock
/// per listing, and by the store's compare-and-commit on the listing
/// version. A version mismatch (another writer sharing the store got there
/// first) is retried up to `max_commit_attempts` times against a fresh
/// snapshot before the caller sees `SlotUnavailable`.
pub struct Engine {
    store: Arc<dyn AppointmentStore>,
    listings: Arc<dyn ListingDirectory>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    locks: KeyedLocks,
}

impl Engine {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        listings: Arc<dyn ListingDirectory>,
        sink: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            listings,
            sink,
            clock: Arc::new(SystemClock),
            config: config.sanitized(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(super) fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    pub(super) async fn snapshot(&self, listing_id: Ulid) -> Result<ListingSnapshot, EngineError> {
        Ok(self.store.snapshot(listing_id).await?)
    }

    /// Fire-and-forget: the transition is already committed.
    pub(super) fn emit(&self, event: DomainEvent) {
        self.sink.publish(&event);
    }

    /// Run `attempt` until it commits or runs out of tries. `Ok(None)` from
    /// `attempt` means the store rejected a stale version.
    pub(super) async fn with_commit_retry<T, F, Fut>(
        &self,
        listing_id: Ulid,
        span: Span,
        mut attempt: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, EngineError>>,
    {
        let tries = self.config.max_commit_attempts;
        for n in 1..=tries {
            if let Some(done) = attempt().await? {
                return Ok(done);
            }
            metrics::counter!(crate::observability::COMMIT_RETRIES_TOTAL).increment(1);
            debug!("listing {listing_id}: stale version on attempt {n}/{tries}");
        }
        warn!("listing {listing_id}: gave up after {tries} commit attempts");
        Err(EngineError::SlotUnavailable { listing_id, span })
    }
}

/// Map a store write result into the retry protocol.
pub(super) fn committed(result: Result<u64, StoreError>) -> Result<Option<u64>, EngineError> {
    match result {
        Ok(version) => Ok(Some(version)),
        Err(StoreError::VersionMismatch { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The appointments touched by `changes`, as they read after the commit,
/// paired with their previous status. Order follows `changes`.
pub(super) fn apply_changes(
    snapshot: &ListingSnapshot,
    changes: &[StatusChange],
    at: Ms,
) -> Vec<(Appointment, AppointmentStatus)> {
    changes
        .iter()
        .filter_map(|change| {
            let mut appointment = snapshot.get(change.id)?.clone();
            appointment.status = change.to;
            appointment.updated_at = at;
            Some((appointment, change.from))
        })
        .collect()
}
