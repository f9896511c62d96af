//! Appointment persistence behind a compare-and-commit interface.
//!
//! Every write names the listing version it was computed against. A store
//! rejects the write with [`StoreError::VersionMismatch`] if the listing has
//! moved on since, so a caller that read, checked and then wrote can never
//! commit on top of state it did not see.

mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Appointment, AppointmentStatus, ListingSnapshot, Ms, StatusChange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    VersionMismatch {
        listing_id: Ulid,
        expected: u64,
        current: u64,
    },
    Duplicate(Ulid),
    Missing(Ulid),
    StatusMismatch {
        id: Ulid,
        expected: AppointmentStatus,
        current: AppointmentStatus,
    },
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::VersionMismatch {
                listing_id,
                expected,
                current,
            } => write!(
                f,
                "listing {listing_id} moved from version {expected} to {current}"
            ),
            StoreError::Duplicate(id) => write!(f, "appointment already stored: {id}"),
            StoreError::Missing(id) => write!(f, "appointment not stored: {id}"),
            StoreError::StatusMismatch {
                id,
                expected,
                current,
            } => write!(f, "appointment {id} is {current}, expected {expected}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// All appointments of a listing, start ascending, with the listing version.
    /// Unknown listings yield an empty snapshot at version 0.
    async fn snapshot(&self, listing_id: Ulid) -> Result<ListingSnapshot, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    /// Every appointment requested by the visitor, in no particular order.
    async fn by_visitor(&self, visitor_id: Ulid) -> Result<Vec<Appointment>, StoreError>;

    /// Listings that have at least one appointment.
    async fn listing_ids(&self) -> Result<Vec<Ulid>, StoreError>;

    /// Store a new appointment if its listing is still at `expected_version`.
    /// Returns the new listing version.
    async fn insert(&self, expected_version: u64, appointment: Appointment) -> Result<u64, StoreError>;

    /// Apply every change or none. Each change's `from` must match the stored
    /// status and the listing must still be at `expected_version`.
    async fn commit(
        &self,
        listing_id: Ulid,
        expected_version: u64,
        changes: Vec<StatusChange>,
        at: Ms,
    ) -> Result<u64, StoreError>;
}
