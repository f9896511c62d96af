use ulid::Ulid;

use crate::model::{AppointmentStatus, Ms, Span};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Requested slot does not start strictly after now.
    InvalidInterval { span: Span, now: Ms },
    InvalidWindow { start: Ms, end: Ms },
    SlotUnavailable { listing_id: Ulid, span: Span },
    /// Unknown appointment or listing.
    NotFound(Ulid),
    Forbidden { actor_id: Ulid, appointment_id: Ulid },
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    LimitExceeded(&'static str),
    Store(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { span, now } => {
                write!(f, "slot {span} must start after {now}")
            }
            EngineError::InvalidWindow { start, end } => {
                write!(f, "availability window [{start}, {end}) is empty")
            }
            EngineError::SlotUnavailable { listing_id, span } => {
                write!(f, "slot {span} unavailable on listing {listing_id}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden {
                actor_id,
                appointment_id,
            } => write!(
                f,
                "{actor_id} is neither visitor nor listing owner of appointment {appointment_id}"
            ),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move appointment from {from} to {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e.to_string())
    }
}
