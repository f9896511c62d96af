//! Viewing-slot scheduling for real-estate listings: conflict detection,
//! slot availability and the appointment state machine with cascade
//! cancellation, over a compare-and-commit appointment store.

pub mod clock;
pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
mod locks;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod wal;
