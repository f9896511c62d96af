use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Back-to-back spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
    ];

    /// Active appointments occupy their slot for conflict purposes.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    /// Edges of the state machine. Same-state requests are not edges.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown appointment status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    /// Case-insensitive, so `"CONFIRMED"` and `"confirmed"` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One viewing request for a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub visitor_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// A single status edge inside a store commit. `from` is the expected
/// current status; the commit is rejected if it no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: Ulid,
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
}

/// One WAL record. A commit is always exactly one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentCreated {
        appointment: Appointment,
    },
    /// Every change of one commit, applied together. A confirm and its
    /// cascade always travel in a single record.
    StatusesChanged {
        listing_id: Ulid,
        changes: Vec<StatusChange>,
        at: Ms,
    },
}

impl Event {
    pub fn listing_id(&self) -> Ulid {
        match self {
            Event::AppointmentCreated { appointment } => appointment.listing_id,
            Event::StatusesChanged { listing_id, .. } => *listing_id,
        }
    }
}

/// Notification-worthy facts handed to the event sink after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DomainEvent {
    AppointmentCreated {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        appointment: Appointment,
        previous: AppointmentStatus,
    },
}

impl DomainEvent {
    pub fn appointment(&self) -> &Appointment {
        match self {
            DomainEvent::AppointmentCreated { appointment }
            | DomainEvent::AppointmentStatusChanged { appointment, .. } => appointment,
        }
    }
}

/// A listing's appointments as of one store version, sorted by `span.start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingSnapshot {
    pub listing_id: Ulid,
    pub version: u64,
    pub appointments: Vec<Appointment>,
}

impl ListingSnapshot {
    pub fn empty(listing_id: Ulid) -> Self {
        Self {
            listing_id,
            version: 0,
            appointments: Vec::new(),
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Return only appointments whose span overlaps the query window.
    /// Uses binary search to skip appointments starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppointmentStats {
    pub pending: u64,
    pub confirmed: u64,
    pub cancelled: u64,
    pub completed: u64,
    /// Active appointments that have not started yet.
    pub upcoming: u64,
}

impl AppointmentStats {
    pub fn total(&self) -> u64 {
        self.pending + self.confirmed + self.cancelled + self.completed
    }

    pub(crate) fn record(&mut self, appointment: &Appointment, now: Ms) {
        match appointment.status {
            AppointmentStatus::Pending => self.pending += 1,
            AppointmentStatus::Confirmed => self.confirmed += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
            AppointmentStatus::Completed => self.completed += 1,
        }
        if appointment.status.is_active() && appointment.span.start > now {
            self.upcoming += 1;
        }
    }
}
