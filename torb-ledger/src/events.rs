//! In-memory event ledger
//!
//! Events live in a dense `Vec` indexed by `id - 1`. Creation and
//! visibility changes take the write lock; readers clone what they need and
//! let go. Callers that must check and then change an event in one step
//! (the visibility policy) hold the [`EventLedger::write`] guard for the
//! whole span.

use crate::{
    types::{Event, EventId},
    Error, Result,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Dense event rows
#[derive(Debug, Default)]
pub struct EventBook {
    rows: Vec<Event>,
}

impl EventBook {
    /// Build from stored rows (ascending id, dense from 1)
    pub fn from_rows(rows: Vec<Event>) -> Result<Self> {
        for (i, event) in rows.iter().enumerate() {
            let expected = i as EventId + 1;
            if event.id != expected {
                return Err(Error::Config(format!(
                    "event rows not dense: found id {} at position {}",
                    event.id, expected
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Append a new event with the next id
    pub fn create(&mut self, title: impl Into<String>, public: bool, price: i64) -> Event {
        let event = Event {
            id: self.rows.len() as EventId + 1,
            title: title.into(),
            public,
            closed: false,
            price,
        };
        self.rows.push(event.clone());
        event
    }

    /// Event by id
    pub fn get(&self, id: EventId) -> Result<&Event> {
        if id <= 0 {
            return Err(Error::event_not_found(id));
        }
        self.rows
            .get((id - 1) as usize)
            .ok_or_else(|| Error::event_not_found(id))
    }

    /// Events in ascending id order, public only unless `include_private`
    pub fn list(&self, include_private: bool) -> Vec<Event> {
        self.rows
            .iter()
            .filter(|e| include_private || e.public)
            .cloned()
            .collect()
    }

    /// Overwrite the visibility flags
    ///
    /// No policy check happens here; see [`crate::visibility`].
    pub fn set_visibility(&mut self, id: EventId, public: bool, closed: bool) -> Result<Event> {
        if id <= 0 {
            return Err(Error::event_not_found(id));
        }
        let event = self
            .rows
            .get_mut((id - 1) as usize)
            .ok_or_else(|| Error::event_not_found(id))?;
        event.public = public;
        event.closed = closed;
        Ok(event.clone())
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No events yet
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Event ledger guarded by a reader-writer lock
#[derive(Debug, Default)]
pub struct EventLedger {
    book: RwLock<EventBook>,
}

impl EventLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with rows loaded from the store
    pub fn bulk_load(&self, rows: Vec<Event>) -> Result<()> {
        self.replace(EventBook::from_rows(rows)?);
        Ok(())
    }

    /// Swap in an already validated book
    pub fn replace(&self, book: EventBook) {
        tracing::info!("Loaded {} events", book.len());
        *self.book.write() = book;
    }

    /// Exclusive guard for structural mutation
    pub fn write(&self) -> RwLockWriteGuard<'_, EventBook> {
        self.book.write()
    }

    /// Shared guard for reads
    pub fn read(&self) -> RwLockReadGuard<'_, EventBook> {
        self.book.read()
    }

    /// See [`EventBook::create`]
    pub fn create(&self, title: impl Into<String>, public: bool, price: i64) -> Event {
        self.book.write().create(title, public, price)
    }

    /// Event by id (cloned)
    pub fn get(&self, id: EventId) -> Result<Event> {
        self.book.read().get(id).cloned()
    }

    /// See [`EventBook::list`]
    pub fn list(&self, include_private: bool) -> Vec<Event> {
        self.book.read().list(include_private)
    }

    /// See [`EventBook::set_visibility`]
    pub fn set_visibility(&self, id: EventId, public: bool, closed: bool) -> Result<Event> {
        self.book.write().set_visibility(id, public, closed)
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.book.read().len()
    }

    /// No events yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
