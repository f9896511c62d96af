use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::wal::{Wal, WalHandle};

use super::{AppointmentStore, InMemoryStore, StoreError};

/// [`InMemoryStore`] indexes with every commit persisted to a WAL first.
///
/// A write is validated, appended (group-committed and fsynced), and only
/// then applied in memory, all under the listing's write lock.
pub struct WalStore {
    memory: InMemoryStore,
    wal: WalHandle,
    path: PathBuf,
    /// Writers share it; compaction takes it exclusively so no record can be
    /// appended to the old file after its state was captured.
    compaction: RwLock<()>,
}

impl WalStore {
    /// Replay the log at `path` and start its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let memory = InMemoryStore::new();
        for event in &events {
            memory.apply_event(event);
        }
        info!(
            "{}: replayed {} records, {} appointments",
            path.display(),
            events.len(),
            memory.len()
        );
        let wal = WalHandle::spawn(Wal::open(path)?);
        Ok(Self {
            memory,
            wal,
            path: path.to_path_buf(),
            compaction: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    async fn persist_and_apply(&self, event: Event, expected_version: u64) -> Result<u64, StoreError> {
        let _writer = self.compaction.read().await;
        let _guard = self.memory.write_lock(event.listing_id()).await;
        self.memory.validate(&event, expected_version)?;
        self.wal.append(event.clone()).await?;
        Ok(self.memory.apply_event(&event))
    }

    /// Rewrite the log with one record per appointment.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.compaction.write().await;
        let events = self.memory.compacted_events();
        let count = events.len();
        self.wal.compact(events).await?;
        info!("{}: compacted to {count} records", self.path.display());
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn snapshot(&self, listing_id: Ulid) -> Result<ListingSnapshot, StoreError> {
        self.memory.snapshot(listing_id).await
    }

    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        self.memory.get(id).await
    }

    async fn by_visitor(&self, visitor_id: Ulid) -> Result<Vec<Appointment>, StoreError> {
        self.memory.by_visitor(visitor_id).await
    }

    async fn listing_ids(&self) -> Result<Vec<Ulid>, StoreError> {
        self.memory.listing_ids().await
    }

    async fn insert(&self, expected_version: u64, appointment: Appointment) -> Result<u64, StoreError> {
        self.persist_and_apply(Event::AppointmentCreated { appointment }, expected_version)
            .await
    }

    async fn commit(
        &self,
        listing_id: Ulid,
        expected_version: u64,
        changes: Vec<StatusChange>,
        at: Ms,
    ) -> Result<u64, StoreError> {
        let event = Event::StatusesChanged {
            listing_id,
            changes,
            at,
        };
        self.persist_and_apply(event, expected_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("viewslot_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn appointment(listing_id: Ulid, start: Ms) -> Appointment {
        Appointment {
            id: Ulid::new(),
            listing_id,
            visitor_id: Ulid::new(),
            span: Span::new(start, start + 100),
            status: AppointmentStatus::Pending,
            note: Some("is parking included?".into()),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let path = test_wal_path("reopen.wal");
        let listing = Ulid::new();
        let a = appointment(listing, 100);
        let b = appointment(listing, 150);
        {
            let store = WalStore::open(&path).unwrap();
            store.insert(0, a.clone()).await.unwrap();
            store.insert(1, b.clone()).await.unwrap();
            let changes = vec![
                StatusChange {
                    id: a.id,
                    from: AppointmentStatus::Pending,
                    to: AppointmentStatus::Confirmed,
                },
                StatusChange {
                    id: b.id,
                    from: AppointmentStatus::Pending,
                    to: AppointmentStatus::Cancelled,
                },
            ];
            store.commit(listing, 2, changes, 9).await.unwrap();
        }

        // One record per commit: two inserts and the cascade.
        assert_eq!(Wal::replay(&path).unwrap().len(), 3);

        let store = WalStore::open(&path).unwrap();
        let snap = store.snapshot(listing).await.unwrap();
        assert_eq!(snap.appointments.len(), 2);
        assert_eq!(snap.appointments[0].status, AppointmentStatus::Confirmed);
        assert_eq!(snap.appointments[1].status, AppointmentStatus::Cancelled);
        assert_eq!(snap.appointments[1].updated_at, 9);
        assert_eq!(snap.appointments[0].note, a.note);
    }

    #[tokio::test]
    async fn rejected_write_is_not_logged() {
        let path = test_wal_path("rejected.wal");
        let listing = Ulid::new();
        let store = WalStore::open(&path).unwrap();
        store.insert(0, appointment(listing, 100)).await.unwrap();

        let err = store.insert(0, appointment(listing, 500)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
        assert_eq!(store.appends_since_compact().await, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn compaction_preserves_state() {
        let path = test_wal_path("compaction.wal");
        let listing = Ulid::new();
        let store = WalStore::open(&path).unwrap();
        let mut version = 0;
        let mut ids = Vec::new();
        for i in 0..5 {
            let a = appointment(listing, i * 1_000);
            ids.push(a.id);
            version = store.insert(version, a).await.unwrap();
        }
        for id in &ids {
            let change = StatusChange {
                id: *id,
                from: AppointmentStatus::Pending,
                to: AppointmentStatus::Cancelled,
            };
            version = store.commit(listing, version, vec![change], 5).await.unwrap();
        }
        assert_eq!(store.appends_since_compact().await, 10);

        store.compact().await.unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(Wal::replay(&path).unwrap().len(), 5);

        let before = store.snapshot(listing).await.unwrap().appointments;
        drop(store);
        let reopened = WalStore::open(&path).unwrap();
        let after = reopened.snapshot(listing).await.unwrap().appointments;
        assert_eq!(before, after);
        assert!(after.iter().all(|a| a.status == AppointmentStatus::Cancelled));
    }
}
