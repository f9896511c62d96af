use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;

use super::conflict::{StatusFilter, conflicts, has_conflict, validate_span};
use super::{Engine, EngineError, apply_changes, committed};

impl Engine {
    /// Request a viewing of `listing_id` starting at `start`. The slot length
    /// comes from the engine config.
    pub async fn create(
        &self,
        listing_id: Ulid,
        visitor_id: Ulid,
        start: Ms,
        note: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        if let Some(ref n) = note
            && n.len() > MAX_NOTE_LEN
        {
            return Err(EngineError::LimitExceeded("note too long"));
        }
        let end = start
            .checked_add(self.config.slot_duration_ms)
            .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
        let span = Span::new(start, end);
        let now = self.now();
        if start <= now {
            return Err(EngineError::InvalidInterval { span, now });
        }
        validate_span(&span)?;
        if self.listings.owner_of(listing_id).await.is_none() {
            return Err(EngineError::NotFound(listing_id));
        }

        let filter = if self.config.pending_may_overlap {
            StatusFilter::Confirmed
        } else {
            StatusFilter::Active
        };

        let _guard = self.locks.lock(listing_id).await;
        let note = &note;
        let appointment = self
            .with_commit_retry(listing_id, span, move || async move {
                let snap = self.snapshot(listing_id).await?;
                if has_conflict(&snap, &span, None, filter) {
                    metrics::counter!(CONFLICTS_TOTAL, "operation" => "create").increment(1);
                    return Err(EngineError::SlotUnavailable { listing_id, span });
                }
                let at = self.now();
                let appointment = Appointment {
                    id: Ulid::new(),
                    listing_id,
                    visitor_id,
                    span,
                    status: AppointmentStatus::Pending,
                    note: note.clone(),
                    created_at: at,
                    updated_at: at,
                };
                let stored = committed(self.store.insert(snap.version, appointment.clone()).await)?;
                Ok(stored.map(|_| appointment))
            })
            .await?;

        info!(
            "appointment {} created on listing {listing_id} at {span}",
            appointment.id
        );
        metrics::counter!(APPOINTMENTS_CREATED_TOTAL).increment(1);
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "create")
            .record(started.elapsed().as_secs_f64());
        self.emit(DomainEvent::AppointmentCreated {
            appointment: appointment.clone(),
        });
        Ok(appointment)
    }

    /// Move an appointment to `requested` on behalf of `actor_id`, who must be
    /// its visitor or the listing's owner.
    ///
    /// Requesting the current status is a no-op returning the appointment
    /// unchanged. Confirming cancels every other pending appointment on the
    /// listing whose slot overlaps, in the same commit; it fails with
    /// `SlotUnavailable` if an overlapping appointment is already confirmed.
    pub async fn change_status(
        &self,
        appointment_id: Ulid,
        requested: AppointmentStatus,
        actor_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let existing = self
            .store
            .get(appointment_id)
            .await?
            .ok_or(EngineError::NotFound(appointment_id))?;
        let listing_id = existing.listing_id;
        // Visitor and listing never change after creation, so this needs no lock.
        let owner = self.listings.owner_of(listing_id).await;
        if actor_id != existing.visitor_id && owner != Some(actor_id) {
            return Err(EngineError::Forbidden {
                actor_id,
                appointment_id,
            });
        }

        let _guard = self.locks.lock(listing_id).await;
        let outcome = self
            .with_commit_retry(listing_id, existing.span, move || async move {
                let snap = self.snapshot(listing_id).await?;
                let current = snap
                    .get(appointment_id)
                    .ok_or(EngineError::NotFound(appointment_id))?;
                if current.status == requested {
                    return Ok(Some((current.clone(), Vec::new())));
                }
                if !current.status.can_transition_to(requested) {
                    return Err(EngineError::InvalidTransition {
                        from: current.status,
                        to: requested,
                    });
                }

                let mut changes = vec![StatusChange {
                    id: appointment_id,
                    from: current.status,
                    to: requested,
                }];
                if requested == AppointmentStatus::Confirmed {
                    let span = current.span;
                    if has_conflict(&snap, &span, Some(appointment_id), StatusFilter::Confirmed) {
                        metrics::counter!(CONFLICTS_TOTAL, "operation" => "confirm").increment(1);
                        return Err(EngineError::SlotUnavailable { listing_id, span });
                    }
                    changes.extend(
                        conflicts(&snap, &span, Some(appointment_id), StatusFilter::Pending).map(
                            |competing| StatusChange {
                                id: competing.id,
                                from: AppointmentStatus::Pending,
                                to: AppointmentStatus::Cancelled,
                            },
                        ),
                    );
                }

                let at = self.now();
                let stored = committed(
                    self.store
                        .commit(listing_id, snap.version, changes.clone(), at)
                        .await,
                )?;
                Ok(stored.map(|_| {
                    let updated = apply_changes(&snap, &changes, at);
                    (updated[0].0.clone(), updated)
                }))
            })
            .await?;

        let (appointment, updated) = outcome;
        if updated.is_empty() {
            debug!("appointment {appointment_id} already {requested}");
            return Ok(appointment);
        }

        let cascaded = updated.len() - 1;
        info!(
            "appointment {appointment_id}: {} -> {requested} by {actor_id}, {cascaded} cascaded",
            updated[0].1
        );
        metrics::counter!(STATUS_CHANGES_TOTAL, "to" => requested.as_str()).increment(1);
        if cascaded > 0 {
            metrics::counter!(STATUS_CHANGES_TOTAL, "to" => AppointmentStatus::Cancelled.as_str())
                .increment(cascaded as u64);
            metrics::counter!(CASCADE_CANCELLATIONS_TOTAL).increment(cascaded as u64);
        }
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => "change_status")
            .record(started.elapsed().as_secs_f64());
        for (appointment, previous) in updated {
            self.emit(DomainEvent::AppointmentStatusChanged {
                appointment,
                previous,
            });
        }
        Ok(appointment)
    }

    /// Cancel every active appointment on the listing that has not started
    /// yet, e.g. when the listing is withdrawn. Returns the cancelled
    /// appointments, start ascending.
    pub async fn cancel_future_for_listing(
        &self,
        listing_id: Ulid,
    ) -> Result<Vec<Appointment>, EngineError> {
        let _guard = self.locks.lock(listing_id).await;
        let cancelled = self.cancel_future_locked(listing_id, |_| true).await?;
        if !cancelled.is_empty() {
            info!(
                "listing {listing_id}: cancelled {} future appointments",
                cancelled.len()
            );
        }
        Ok(cancelled)
    }

    /// Cancel every active, not yet started appointment of the visitor,
    /// e.g. when the user is removed. Listings are locked together in id
    /// order and committed one by one.
    pub async fn cancel_future_for_visitor(
        &self,
        visitor_id: Ulid,
    ) -> Result<Vec<Appointment>, EngineError> {
        let now = self.now();
        let listing_ids: BTreeSet<Ulid> = self
            .store
            .by_visitor(visitor_id)
            .await?
            .into_iter()
            .filter(|a| a.status.is_active() && a.span.start > now)
            .map(|a| a.listing_id)
            .collect();
        let listing_ids: Vec<Ulid> = listing_ids.into_iter().collect();

        let _guards = self.locks.lock_many(&listing_ids).await;
        let mut cancelled = Vec::new();
        for listing_id in listing_ids {
            cancelled.extend(
                self.cancel_future_locked(listing_id, |a| a.visitor_id == visitor_id)
                    .await?,
            );
        }
        if !cancelled.is_empty() {
            info!(
                "visitor {visitor_id}: cancelled {} future appointments",
                cancelled.len()
            );
        }
        Ok(cancelled)
    }

    /// Caller holds the listing lock.
    async fn cancel_future_locked(
        &self,
        listing_id: Ulid,
        select: impl Fn(&Appointment) -> bool,
    ) -> Result<Vec<Appointment>, EngineError> {
        let select = &select;
        let whole_listing = Span::new(MIN_VALID_TIMESTAMP_MS, MAX_VALID_TIMESTAMP_MS);
        let updated = self
            .with_commit_retry(listing_id, whole_listing, move || async move {
                let snap = self.snapshot(listing_id).await?;
                let at = self.now();
                let changes: Vec<StatusChange> = snap
                    .appointments
                    .iter()
                    .filter(|&a| a.status.is_active() && a.span.start > at && select(a))
                    .map(|a| StatusChange {
                        id: a.id,
                        from: a.status,
                        to: AppointmentStatus::Cancelled,
                    })
                    .collect();
                if changes.is_empty() {
                    return Ok(Some(Vec::new()));
                }
                let stored = committed(
                    self.store
                        .commit(listing_id, snap.version, changes.clone(), at)
                        .await,
                )?;
                Ok(stored.map(|_| apply_changes(&snap, &changes, at)))
            })
            .await?;

        if !updated.is_empty() {
            metrics::counter!(STATUS_CHANGES_TOTAL, "to" => AppointmentStatus::Cancelled.as_str())
                .increment(updated.len() as u64);
        }
        let mut cancelled = Vec::with_capacity(updated.len());
        for (appointment, previous) in updated {
            cancelled.push(appointment.clone());
            self.emit(DomainEvent::AppointmentStatusChanged {
                appointment,
                previous,
            });
        }
        Ok(cancelled)
    }
}
