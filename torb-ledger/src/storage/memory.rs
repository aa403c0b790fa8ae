//! In-process store
//!
//! Applies commands with the same row semantics as the MySQL store: a batch
//! either lands whole or not at all. Can be told to fail every write, which
//! is how the writer's failure path is exercised in tests.

use super::{Store, WriteCommand};
use crate::{
    types::{Event, Reservation},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default, Clone)]
struct Tables {
    events: Vec<Event>,
    reservations: Vec<Reservation>,
}

/// Store backed by two vectors
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    batches: AtomicUsize,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with rows
    pub fn with_rows(events: Vec<Event>, reservations: Vec<Reservation>) -> Self {
        Self {
            tables: Mutex::new(Tables { events, reservations }),
            ..Self::default()
        }
    }

    /// Make every subsequent `apply` fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored events
    pub fn events(&self) -> Vec<Event> {
        self.tables.lock().events.clone()
    }

    /// Stored reservations
    pub fn reservations(&self) -> Vec<Reservation> {
        self.tables.lock().reservations.clone()
    }

    /// Batches applied successfully so far
    pub fn batches_applied(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_events(&self) -> Result<Vec<Event>> {
        let mut events = self.events();
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn load_reservations(&self) -> Result<Vec<Reservation>> {
        let mut reservations = self.reservations();
        reservations.sort_by_key(|r| r.id);
        Ok(reservations)
    }

    async fn apply(&self, batch: &[WriteCommand]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store is failing writes",
            )));
        }

        let mut guard = self.tables.lock();
        let mut tables = guard.clone();
        for command in batch {
            match command {
                WriteCommand::InsertEvent(event) => {
                    if tables.events.iter().any(|e| e.id == event.id) {
                        return Err(Error::Config(format!("duplicate event id {}", event.id)));
                    }
                    tables.events.push(event.clone());
                }
                WriteCommand::InsertReservation(reservation) => {
                    if tables.reservations.iter().any(|r| r.id == reservation.id) {
                        return Err(Error::Config(format!(
                            "duplicate reservation id {}",
                            reservation.id
                        )));
                    }
                    tables.reservations.push(reservation.clone());
                }
                WriteCommand::CancelReservation { id, canceled_at } => {
                    if let Some(row) = tables.reservations.iter_mut().find(|r| r.id == *id) {
                        row.canceled_at = Some(*canceled_at);
                    }
                }
                WriteCommand::UpdateVisibility { id, public, closed } => {
                    if let Some(row) = tables.events.iter_mut().find(|e| e.id == *id) {
                        row.public = *public;
                        row.closed = *closed;
                    }
                }
            }
        }
        *guard = tables;
        drop(guard);

        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
