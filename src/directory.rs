use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

/// Listing ownership lookup, supplied by the surrounding application.
#[async_trait]
pub trait ListingDirectory: Send + Sync {
    /// Owner of the listing, or `None` if the listing does not exist.
    async fn owner_of(&self, listing_id: Ulid) -> Option<Ulid>;

    async fn listings_owned_by(&self, owner_id: Ulid) -> Vec<Ulid>;
}

#[derive(Default)]
pub struct InMemoryDirectory {
    owners: DashMap<Ulid, Ulid>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listing_id: Ulid, owner_id: Ulid) {
        self.owners.insert(listing_id, owner_id);
    }

    pub fn remove(&self, listing_id: &Ulid) -> Option<Ulid> {
        self.owners.remove(listing_id).map(|(_, owner)| owner)
    }
}

#[async_trait]
impl ListingDirectory for InMemoryDirectory {
    async fn owner_of(&self, listing_id: Ulid) -> Option<Ulid> {
        self.owners.get(&listing_id).map(|e| *e.value())
    }

    async fn listings_owned_by(&self, owner_id: Ulid) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self
            .owners
            .iter()
            .filter(|e| *e.value() == owner_id)
            .map(|e| *e.key())
            .collect();
        ids.sort();
        ids
    }
}
