use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Which appointments count as occupying their slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Pending or Confirmed.
    Active,
    Pending,
    Confirmed,
}

impl StatusFilter {
    pub fn accepts(self, status: AppointmentStatus) -> bool {
        match self {
            StatusFilter::Active => status.is_active(),
            StatusFilter::Pending => status == AppointmentStatus::Pending,
            StatusFilter::Confirmed => status == AppointmentStatus::Confirmed,
        }
    }
}

/// Appointments on the listing accepted by `filter`, other than `exclude`,
/// whose span overlaps `span`. Start ascending.
pub fn conflicts<'a>(
    snapshot: &'a ListingSnapshot,
    span: &Span,
    exclude: Option<Ulid>,
    filter: StatusFilter,
) -> impl Iterator<Item = &'a Appointment> {
    snapshot
        .overlapping(span)
        .filter(move |a| Some(a.id) != exclude && filter.accepts(a.status))
}

pub fn has_conflict(
    snapshot: &ListingSnapshot,
    span: &Span,
    exclude: Option<Ulid>,
    filter: StatusFilter,
) -> bool {
    conflicts(snapshot, span, exclude, filter).next().is_some()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}
