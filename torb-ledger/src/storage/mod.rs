//! Durable store seam
//!
//! The store is read once at boot (and on explicit reload) and otherwise only
//! written by the background writer. Request handlers never query it.
//!
//! - [`mysql::MySqlStore`] - the relational store behind the service
//! - [`memory::MemoryStore`] - in-process store for tests and local runs

pub mod memory;
pub mod mysql;

use crate::{
    types::{Event, EventId, Reservation, ReservationId},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

/// One in-memory mutation to mirror into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCommand {
    /// New event row
    InsertEvent(Event),

    /// New reservation row
    InsertReservation(Reservation),

    /// `canceled_at` set on an existing reservation
    CancelReservation {
        /// Reservation id
        id: ReservationId,
        /// Cancellation time
        canceled_at: DateTime<Utc>,
    },

    /// Visibility flags changed
    UpdateVisibility {
        /// Event id
        id: EventId,
        /// New public flag
        public: bool,
        /// New closed flag
        closed: bool,
    },
}

impl WriteCommand {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            WriteCommand::InsertEvent(_) => "insert_event",
            WriteCommand::InsertReservation(_) => "insert_reservation",
            WriteCommand::CancelReservation { .. } => "cancel_reservation",
            WriteCommand::UpdateVisibility { .. } => "update_visibility",
        }
    }
}

/// Backing store for both ledgers
#[async_trait]
pub trait Store: Send + Sync {
    /// Every event row, ascending id
    async fn load_events(&self) -> Result<Vec<Event>>;

    /// Every reservation row, ascending id
    async fn load_reservations(&self) -> Result<Vec<Reservation>>;

    /// Apply a batch of commands in order, all or nothing
    ///
    /// On error none of the batch is visible in the store.
    async fn apply(&self, batch: &[WriteCommand]) -> Result<()>;
}
