//! Error types for the seat ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Everything above `Database` is an expected, caller-visible outcome and is
/// mapped to a 4xx (or 503) response by the HTTP layer. Durable-write failures never
/// show up here: the writer logs them and moves on.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown event or reservation id
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up ("event", "reservation")
        kind: &'static str,
        /// The id that missed
        id: i64,
    },

    /// Seat id or seat number outside the catalog
    #[error("Seat out of range: {0}")]
    OutOfRange(i64),

    /// Reserve or cancel on an event that is missing, not public, or closed
    #[error("Invalid event: {0}")]
    InvalidEvent(i64),

    /// Unknown rank label
    #[error("Invalid rank: {0}")]
    InvalidRank(String),

    /// No free seat left in the requested rank
    #[error("Sold out: event {event_id} rank {rank}")]
    SoldOut {
        /// Event that was asked for
        event_id: i64,
        /// Rank label
        rank: String,
    },

    /// Cancel on a reservation whose `canceled_at` is already set
    #[error("Reservation already canceled: {0}")]
    AlreadyCanceled(i64),

    /// Actor does not own the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Cancel on a seat that has no active reservation
    #[error("Seat {sheet_id} of event {event_id} is not reserved")]
    NotReserved {
        /// Event id
        event_id: i64,
        /// Global seat id
        sheet_id: i64,
    },

    /// Append on a seat that already has an active reservation
    #[error("Seat {sheet_id} of event {event_id} is already taken")]
    SeatTaken {
        /// Event id
        event_id: i64,
        /// Global seat id
        sheet_id: i64,
    },

    /// Edit on a closed event
    #[error("Event {0} is closed and cannot be edited")]
    EventClosed(i64),

    /// Close requested on an event that is still public
    #[error("Event {0} is public and cannot be closed directly")]
    CannotClosePublic(i64),

    /// Requested flag combination is not a state
    #[error("Invalid visibility for event {0}: public and closed together")]
    InvalidVisibility(i64),

    /// Request field rejected before touching a ledger
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mutation refused while the ledgers are being reloaded
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Relational store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Report serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Concurrency error (writer queue closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration or boot-load error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing event
    pub fn event_not_found(id: i64) -> Self {
        Error::NotFound { kind: "event", id }
    }

    /// Shorthand for a missing reservation
    pub fn reservation_not_found(id: i64) -> Self {
        Error::NotFound {
            kind: "reservation",
            id,
        }
    }

    /// Whether this is an expected domain outcome rather than an
    /// infrastructure failure
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Error::Database(_)
                | Error::Csv(_)
                | Error::Metrics(_)
                | Error::Concurrency(_)
                | Error::Config(_)
                | Error::Io(_)
        )
    }
}
