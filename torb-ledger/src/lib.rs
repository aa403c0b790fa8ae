//! Torb seat ledger
//!
//! In-memory event and reservation ledgers with random seat allocation and
//! asynchronous write-back to a relational store.
//!
//! # Architecture
//!
//! - **Memory First**: Both ledgers live in memory; the store is read at boot
//! - **Short Critical Sections**: One lock per ledger, never held together
//! - **Single Writer**: One background task mirrors mutations to the store
//! - **One Projection**: Detailed and listing views derive from one computation
//!
//! # Invariants
//!
//! - Conservation: remaining seats + active reservations == seats in the house
//! - At most one active reservation per (event, seat)
//! - Append-only: reservations are canceled in place, never removed
//! - A closed event is never edited again

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod allocator;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod office;
pub mod projection;
pub mod report;
pub mod reservations;
pub mod storage;
pub mod types;
pub mod visibility;
pub mod writer;

// Re-exports
pub use catalog::SheetCatalog;
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use office::{BoxOffice, ReservationReceipt};
pub use projection::{ProjectedEvent, PublicEvent};
pub use types::{Event, EventId, Rank, Reservation, ReservationId, Seat, SheetId, UserId};
