use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use ulid::Ulid;

use crate::locks::KeyedLocks;
use crate::model::*;

use super::{AppointmentStore, StoreError};

/// Per-listing ordering and version counter.
#[derive(Debug, Default)]
struct ListingIndex {
    version: u64,
    /// `(span.start, id)`, sorted.
    entries: Vec<(Ms, Ulid)>,
}

pub struct InMemoryStore {
    appointments: DashMap<Ulid, Appointment>,
    listings: DashMap<Ulid, ListingIndex>,
    visitors: DashMap<Ulid, Vec<Ulid>>,
    write_locks: KeyedLocks,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            appointments: DashMap::new(),
            listings: DashMap::new(),
            visitors: DashMap::new(),
            write_locks: KeyedLocks::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    /// Serializes validate-then-apply for one listing.
    pub(crate) async fn write_lock(&self, listing_id: Ulid) -> OwnedMutexGuard<()> {
        self.write_locks.lock(listing_id).await
    }

    fn version(&self, listing_id: Ulid) -> u64 {
        self.listings.get(&listing_id).map_or(0, |idx| idx.version)
    }

    fn check_version(&self, listing_id: Ulid, expected: u64) -> Result<(), StoreError> {
        let current = self.version(listing_id);
        if current != expected {
            return Err(StoreError::VersionMismatch {
                listing_id,
                expected,
                current,
            });
        }
        Ok(())
    }

    /// Check that `event` may be applied on top of `expected_version`.
    /// Caller holds the listing's write lock.
    pub(crate) fn validate(&self, event: &Event, expected_version: u64) -> Result<(), StoreError> {
        self.check_version(event.listing_id(), expected_version)?;
        match event {
            Event::AppointmentCreated { appointment } => {
                if self.appointments.contains_key(&appointment.id) {
                    return Err(StoreError::Duplicate(appointment.id));
                }
            }
            Event::StatusesChanged {
                listing_id, changes, ..
            } => {
                for change in changes {
                    let stored = self
                        .appointments
                        .get(&change.id)
                        .ok_or(StoreError::Missing(change.id))?;
                    if stored.listing_id != *listing_id {
                        return Err(StoreError::Missing(change.id));
                    }
                    if stored.status != change.from {
                        return Err(StoreError::StatusMismatch {
                            id: change.id,
                            expected: change.from,
                            current: stored.status,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply an event unconditionally and return the listing's new version.
    /// Used after validation and during WAL replay.
    pub(crate) fn apply_event(&self, event: &Event) -> u64 {
        match event {
            Event::AppointmentCreated { appointment } => {
                let version = {
                    let mut idx = self.listings.entry(appointment.listing_id).or_default();
                    let key = (appointment.span.start, appointment.id);
                    let pos = idx.entries.binary_search(&key).unwrap_or_else(|e| e);
                    idx.entries.insert(pos, key);
                    idx.version += 1;
                    self.appointments.insert(appointment.id, appointment.clone());
                    idx.version
                };
                self.visitors
                    .entry(appointment.visitor_id)
                    .or_default()
                    .push(appointment.id);
                version
            }
            Event::StatusesChanged {
                listing_id,
                changes,
                at,
            } => {
                let mut idx = self.listings.entry(*listing_id).or_default();
                for change in changes {
                    if let Some(mut stored) = self.appointments.get_mut(&change.id) {
                        stored.status = change.to;
                        stored.updated_at = *at;
                    }
                }
                idx.version += 1;
                idx.version
            }
        }
    }

    pub(crate) fn snapshot_now(&self, listing_id: Ulid) -> ListingSnapshot {
        let Some(idx) = self.listings.get(&listing_id) else {
            return ListingSnapshot::empty(listing_id);
        };
        let appointments = idx
            .entries
            .iter()
            .filter_map(|(_, id)| self.appointments.get(id).map(|a| a.value().clone()))
            .collect();
        ListingSnapshot {
            listing_id,
            version: idx.version,
            appointments,
        }
    }

    pub(crate) fn sorted_listing_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.listings.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// The minimal record set that recreates the current state: one
    /// creation record per appointment, carrying its current status.
    pub(crate) fn compacted_events(&self) -> Vec<Event> {
        self.sorted_listing_ids()
            .into_iter()
            .flat_map(|listing_id| self.snapshot_now(listing_id).appointments)
            .map(|appointment| Event::AppointmentCreated { appointment })
            .collect()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn snapshot(&self, listing_id: Ulid) -> Result<ListingSnapshot, StoreError> {
        Ok(self.snapshot_now(listing_id))
    }

    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.get(&id).map(|a| a.value().clone()))
    }

    async fn by_visitor(&self, visitor_id: Ulid) -> Result<Vec<Appointment>, StoreError> {
        let ids = self
            .visitors
            .get(&visitor_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.appointments.get(id).map(|a| a.value().clone()))
            .collect())
    }

    async fn listing_ids(&self) -> Result<Vec<Ulid>, StoreError> {
        Ok(self.sorted_listing_ids())
    }

    async fn insert(&self, expected_version: u64, appointment: Appointment) -> Result<u64, StoreError> {
        let _guard = self.write_lock(appointment.listing_id).await;
        let event = Event::AppointmentCreated { appointment };
        self.validate(&event, expected_version)?;
        Ok(self.apply_event(&event))
    }

    async fn commit(
        &self,
        listing_id: Ulid,
        expected_version: u64,
        changes: Vec<StatusChange>,
        at: Ms,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock(listing_id).await;
        let event = Event::StatusesChanged {
            listing_id,
            changes,
            at,
        };
        self.validate(&event, expected_version)?;
        Ok(self.apply_event(&event))
    }
}
