//! Core types for the seat ledger
//!
//! Ids are plain `i64` so they line up with the `BIGINT` columns of the
//! backing store. Timestamps are UTC with microsecond precision.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Event id (dense, from 1)
pub type EventId = i64;

/// Reservation id (dense, from 1)
pub type ReservationId = i64;

/// Global seat id (dense, from 1 across all ranks)
pub type SheetId = i64;

/// User id as handed over by the auth layer
pub type UserId = i64;

/// Seat quality / price tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    /// Premium tier
    S,
    /// Second tier
    A,
    /// Third tier
    B,
    /// Standard tier
    C,
}

impl Rank {
    /// All ranks in catalog order
    pub const ALL: [Rank; 4] = [Rank::S, Rank::A, Rank::B, Rank::C];

    /// Label as used on the wire and in reports
    pub fn label(&self) -> &'static str {
        match self {
            Rank::S => "S",
            Rank::A => "A",
            Rank::B => "B",
            Rank::C => "C",
        }
    }

    /// Position in `Rank::ALL`
    pub fn index(&self) -> usize {
        match self {
            Rank::S => 0,
            Rank::A => 1,
            Rank::B => 2,
            Rank::C => 3,
        }
    }
}

impl FromStr for Rank {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(Rank::S),
            "A" => Ok(Rank::A),
            "B" => Ok(Rank::B),
            "C" => Ok(Rank::C),
            other => Err(Error::InvalidRank(other.to_string())),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Static seat block of one rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// First global seat id of the rank
    pub first_id: SheetId,
    /// Number of seats in the rank
    pub count: i64,
    /// Price added on top of the event base price
    pub price: i64,
}

/// One purchasable seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Global seat id
    pub id: SheetId,
    /// Rank the seat belongs to
    pub rank: Rank,
    /// Ordinal within the rank, from 1
    pub num: i64,
    /// Rank price delta
    pub price: i64,
}

/// Event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id
    pub id: EventId,
    /// Title (immutable)
    pub title: String,
    /// Visible to the public listing
    pub public: bool,
    /// Closed for good
    pub closed: bool,
    /// Base price (immutable)
    pub price: i64,
}

/// Reservation record
///
/// Only `canceled_at` ever changes, and only once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation id
    pub id: ReservationId,
    /// Event the seat was reserved for
    pub event_id: EventId,
    /// Global seat id
    pub sheet_id: SheetId,
    /// Owner
    pub user_id: UserId,
    /// When the seat was taken
    pub reserved_at: DateTime<Utc>,
    /// When the reservation was released, if ever
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Still holding its seat
    pub fn is_active(&self) -> bool {
        self.canceled_at.is_none()
    }

    /// Cancellation time if canceled, otherwise reservation time
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.canceled_at.unwrap_or(self.reserved_at)
    }
}

/// Current time truncated to the store's microsecond precision
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
