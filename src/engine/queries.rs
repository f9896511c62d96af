use std::cmp::Reverse;

use ulid::Ulid;

use crate::model::*;

use super::availability::available_slots;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        self.store
            .get(appointment_id)
            .await?
            .ok_or(EngineError::NotFound(appointment_id))
    }

    /// Visitor history, most recent slot first.
    pub async fn list_by_visitor(&self, visitor_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        let mut appointments = self.store.by_visitor(visitor_id).await?;
        appointments.sort_by_key(|a| (Reverse(a.span.start), a.id));
        Ok(appointments)
    }

    /// Listing schedule, earliest slot first. Every status is included.
    pub async fn list_by_listing(&self, listing_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        Ok(self.snapshot(listing_id).await?.appointments)
    }

    pub async fn available_slots(
        &self,
        listing_id: Ulid,
        window_start: Ms,
        window_end: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        if self.listings.owner_of(listing_id).await.is_none() {
            return Err(EngineError::NotFound(listing_id));
        }
        let snap = self.snapshot(listing_id).await?;
        available_slots(
            &snap,
            window_start,
            window_end,
            self.config.slot_duration_ms,
            self.now(),
        )
    }

    /// Agenda across every listing the owner holds: appointments starting at
    /// or after now in any status, earliest first.
    pub async fn upcoming_for_owner(&self, owner_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        let now = self.now();
        let mut agenda = Vec::new();
        for listing_id in self.listings.listings_owned_by(owner_id).await {
            let snap = self.snapshot(listing_id).await?;
            agenda.extend(snap.appointments.into_iter().filter(|a| a.span.start >= now));
        }
        agenda.sort_by_key(|a| (a.span.start, a.id));
        Ok(agenda)
    }

    pub async fn stats(&self) -> Result<AppointmentStats, EngineError> {
        let now = self.now();
        let mut stats = AppointmentStats::default();
        for listing_id in self.store.listing_ids().await? {
            for appointment in &self.snapshot(listing_id).await?.appointments {
                stats.record(appointment, now);
            }
        }
        Ok(stats)
    }
}
