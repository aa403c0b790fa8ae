//! Event visibility state machine
//!
//! ```text
//!   Draft (private, open) ──▶ Public ──▶ Draft
//!     │
//!     └──────────────▶ Closed  (terminal)
//! ```
//!
//! `Public → Closed` is refused: an event has to go back to draft before it
//! can be closed. `public = true, closed = true` is not a state at all.
//! The event ledger itself trusts its caller; the box office runs
//! [`check_transition`] before calling `EventLedger::set_visibility`.

use crate::{
    types::{Event, EventId},
    Error, Result,
};
use serde::Serialize;
use std::fmt;

/// Visibility state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Private and open
    Draft,
    /// Listed and open for reservations
    Public,
    /// Terminal
    Closed,
}

impl EventState {
    /// State of a stored event
    ///
    /// Stored rows with both flags set are read as closed.
    pub fn of(event: &Event) -> Self {
        if event.closed {
            EventState::Closed
        } else if event.public {
            EventState::Public
        } else {
            EventState::Draft
        }
    }

    /// State requested by an edit, if the flag pair names one
    pub fn requested(public: bool, closed: bool) -> Option<Self> {
        match (public, closed) {
            (false, false) => Some(EventState::Draft),
            (true, false) => Some(EventState::Public),
            (false, true) => Some(EventState::Closed),
            (true, true) => None,
        }
    }

    /// `(public, closed)` flags of the state
    pub fn flags(&self) -> (bool, bool) {
        match self {
            EventState::Draft => (false, false),
            EventState::Public => (true, false),
            EventState::Closed => (false, true),
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventState::Draft => "draft",
            EventState::Public => "public",
            EventState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Validate an edit of `event` to the requested flags
///
/// Returns the target state on success.
pub fn check_transition(event: &Event, public: bool, closed: bool) -> Result<EventState> {
    let id: EventId = event.id;
    let from = EventState::of(event);
    let to = EventState::requested(public, closed).ok_or(Error::InvalidVisibility(id))?;

    match (from, to) {
        (EventState::Closed, _) => Err(Error::EventClosed(id)),
        (EventState::Public, EventState::Closed) => Err(Error::CannotClosePublic(id)),
        _ => Ok(to),
    }
}
