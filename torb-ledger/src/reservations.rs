//! In-memory reservation ledger
//!
//! Append-only: a cancellation sets `canceled_at` on the existing row and
//! never removes it. The ledger is the source of truth for seat occupancy.
//!
//! # Locking
//!
//! [`ReservationLedger`] wraps a [`ReservationBook`] in a single mutex.
//! Anything that reads, decides and then writes (allocation, cancellation)
//! works on the `&mut ReservationBook` behind one [`ReservationLedger::lock`]
//! guard so no other caller can observe the half-done state. The one-shot
//! methods on the ledger itself each take and release the lock.
//!
//! # Invariants
//!
//! - Ids are dense from 1 and assigned in the append critical section
//! - At most one active row per `(event_id, sheet_id)`
//! - `canceled_at` goes from `None` to `Some` at most once

use crate::{
    types::{EventId, Reservation, ReservationId, SheetId, UserId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

/// Reservation rows plus occupancy indices
#[derive(Debug, Default)]
pub struct ReservationBook {
    /// All rows, index = id - 1
    rows: Vec<Reservation>,

    /// event -> seat -> row index, active rows only
    active: HashMap<EventId, HashMap<SheetId, usize>>,

    /// user -> row indices, every row
    by_user: HashMap<UserId, Vec<usize>>,
}

impl ReservationBook {
    /// Build from stored rows (ascending id, dense from 1)
    pub fn from_rows(rows: Vec<Reservation>) -> Result<Self> {
        let mut book = Self::default();
        for row in rows {
            let expected = book.rows.len() as ReservationId + 1;
            if row.id != expected {
                return Err(Error::Config(format!(
                    "reservation rows not dense: found id {} at position {}",
                    row.id, expected
                )));
            }
            book.insert(row)?;
        }
        Ok(book)
    }

    fn insert(&mut self, row: Reservation) -> Result<()> {
        let idx = self.rows.len();
        if row.is_active() {
            let seats = self.active.entry(row.event_id).or_default();
            if seats.contains_key(&row.sheet_id) {
                return Err(Error::SeatTaken {
                    event_id: row.event_id,
                    sheet_id: row.sheet_id,
                });
            }
            seats.insert(row.sheet_id, idx);
        }
        self.by_user.entry(row.user_id).or_default().push(idx);
        self.rows.push(row);
        Ok(())
    }

    /// Append an active reservation with the next id
    ///
    /// The caller is expected to have picked a free seat under the same
    /// guard; a taken seat is still refused rather than double-booked.
    pub fn append(
        &mut self,
        event_id: EventId,
        sheet_id: SheetId,
        user_id: UserId,
        reserved_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let row = Reservation {
            id: self.rows.len() as ReservationId + 1,
            event_id,
            sheet_id,
            user_id,
            reserved_at,
            canceled_at: None,
        };
        self.insert(row.clone())?;
        Ok(row)
    }

    /// Set `canceled_at` on an active reservation
    pub fn cancel(
        &mut self,
        id: ReservationId,
        canceled_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        if id <= 0 {
            return Err(Error::reservation_not_found(id));
        }
        let idx = (id - 1) as usize;
        let row = self
            .rows
            .get_mut(idx)
            .ok_or_else(|| Error::reservation_not_found(id))?;
        if row.canceled_at.is_some() {
            return Err(Error::AlreadyCanceled(id));
        }
        row.canceled_at = Some(canceled_at);

        if let Some(seats) = self.active.get_mut(&row.event_id) {
            seats.remove(&row.sheet_id);
        }
        Ok(row.clone())
    }

    /// Row by id
    pub fn get(&self, id: ReservationId) -> Result<&Reservation> {
        if id <= 0 {
            return Err(Error::reservation_not_found(id));
        }
        self.rows
            .get((id - 1) as usize)
            .ok_or_else(|| Error::reservation_not_found(id))
    }

    /// Seats currently held for an event
    pub fn active_seats(&self, event_id: EventId) -> impl Iterator<Item = SheetId> + '_ {
        self.active
            .get(&event_id)
            .into_iter()
            .flat_map(|seats| seats.keys().copied())
    }

    /// Number of active reservations for an event
    pub fn active_count(&self, event_id: EventId) -> usize {
        self.active.get(&event_id).map_or(0, HashMap::len)
    }

    /// Active reservations for an event, in no particular order
    pub fn active_for(&self, event_id: EventId) -> Vec<Reservation> {
        self.active
            .get(&event_id)
            .into_iter()
            .flat_map(|seats| seats.values())
            .map(|&idx| self.rows[idx].clone())
            .collect()
    }

    /// The active reservation holding a seat, if any
    pub fn active_for_seat(&self, event_id: EventId, sheet_id: SheetId) -> Option<&Reservation> {
        self.active
            .get(&event_id)
            .and_then(|seats| seats.get(&sheet_id))
            .map(|&idx| &self.rows[idx])
    }

    /// Every reservation of a user, canceled ones included, in id order
    pub fn all_for(&self, user_id: UserId) -> Vec<Reservation> {
        self.by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .map(|&idx| self.rows[idx].clone())
            .collect()
    }

    /// Whole ledger ascending by `reserved_at`
    pub fn all_ordered_by_reserved_at(&self) -> Vec<Reservation> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|r| r.reserved_at);
        rows
    }

    /// One event's reservations ascending by `reserved_at`
    pub fn all_for_event_ordered(&self, event_id: EventId) -> Vec<Reservation> {
        let mut rows: Vec<Reservation> = self
            .rows
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.reserved_at);
        rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// No rows yet
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reservation ledger guarded by one exclusive lock
#[derive(Debug, Default)]
pub struct ReservationLedger {
    book: Mutex<ReservationBook>,
}

impl ReservationLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with rows loaded from the store
    pub fn bulk_load(&self, rows: Vec<Reservation>) -> Result<()> {
        self.replace(ReservationBook::from_rows(rows)?);
        Ok(())
    }

    /// Swap in an already validated book
    pub fn replace(&self, book: ReservationBook) {
        tracing::info!("Loaded {} reservations", book.len());
        *self.book.lock() = book;
    }

    /// Take the ledger lock for a read-decide-write span
    pub fn lock(&self) -> MutexGuard<'_, ReservationBook> {
        self.book.lock()
    }

    /// See [`ReservationBook::append`]
    pub fn append(
        &self,
        event_id: EventId,
        sheet_id: SheetId,
        user_id: UserId,
        reserved_at: DateTime<Utc>,
    ) -> Result<Reservation> {
        self.book.lock().append(event_id, sheet_id, user_id, reserved_at)
    }

    /// See [`ReservationBook::cancel`]
    pub fn cancel(&self, id: ReservationId, canceled_at: DateTime<Utc>) -> Result<Reservation> {
        self.book.lock().cancel(id, canceled_at)
    }

    /// Snapshot of an event's active reservations
    pub fn active_for(&self, event_id: EventId) -> Vec<Reservation> {
        self.book.lock().active_for(event_id)
    }

    /// Snapshot of a user's reservations
    pub fn all_for(&self, user_id: UserId) -> Vec<Reservation> {
        self.book.lock().all_for(user_id)
    }

    /// Snapshot of the whole ledger ascending by `reserved_at`
    pub fn all_ordered_by_reserved_at(&self) -> Vec<Reservation> {
        self.book.lock().all_ordered_by_reserved_at()
    }

    /// Snapshot of one event's reservations ascending by `reserved_at`
    pub fn all_for_event_ordered(&self, event_id: EventId) -> Vec<Reservation> {
        self.book.lock().all_for_event_ordered(event_id)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.book.lock().len()
    }

    /// No rows yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_micros;
    use chrono::Duration;

    #[test]
    fn test_append_assigns_dense_ids() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        let a = ledger.append(1, 10, 100, t).unwrap();
        let b = ledger.append(1, 11, 100, t).unwrap();
        let c = ledger.append(2, 10, 200, t).unwrap();

        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert!(a.is_active());
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_append_refuses_taken_seat() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        ledger.append(1, 10, 100, t).unwrap();
        let err = ledger.append(1, 10, 200, t).unwrap_err();
        assert!(matches!(err, Error::SeatTaken { event_id: 1, sheet_id: 10 }));
        assert_eq!(ledger.len(), 1);

        // Same seat for another event is fine
        ledger.append(2, 10, 200, t).unwrap();
    }

    #[test]
    fn test_cancel_frees_seat() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        let r = ledger.append(1, 10, 100, t).unwrap();
        let canceled = ledger.cancel(r.id, t + Duration::seconds(1)).unwrap();
        assert_eq!(canceled.canceled_at, Some(t + Duration::seconds(1)));
        assert!(ledger.active_for(1).is_empty());

        // Seat can be taken again; the old row stays
        let again = ledger.append(1, 10, 300, t).unwrap();
        assert_eq!(again.id, 2);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_double_cancel_is_rejected_and_leaves_state() {
        let ledger = ReservationLedger::new();
        let t0 = now_micros();
        let t1 = t0 + Duration::seconds(1);
        let t2 = t0 + Duration::seconds(2);

        let r = ledger.append(1, 10, 100, t0).unwrap();
        ledger.cancel(r.id, t1).unwrap();

        let err = ledger.cancel(r.id, t2).unwrap_err();
        assert!(matches!(err, Error::AlreadyCanceled(1)));

        let book = ledger.lock();
        assert_eq!(book.get(r.id).unwrap().canceled_at, Some(t1));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_cancel_unknown_id() {
        let ledger = ReservationLedger::new();
        assert!(matches!(
            ledger.cancel(5, now_micros()),
            Err(Error::NotFound { kind: "reservation", id: 5 })
        ));
        assert!(ledger.cancel(0, now_micros()).is_err());
    }

    #[test]
    fn test_active_queries() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        ledger.append(1, 10, 100, t).unwrap();
        let r = ledger.append(1, 11, 100, t).unwrap();
        ledger.append(2, 12, 100, t).unwrap();
        ledger.cancel(r.id, t).unwrap();

        let mut seats: Vec<SheetId> = ledger.active_for(1).iter().map(|r| r.sheet_id).collect();
        seats.sort_unstable();
        assert_eq!(seats, vec![10]);

        let book = ledger.lock();
        assert_eq!(book.active_count(1), 1);
        assert_eq!(book.active_for_seat(1, 10).map(|r| r.id), Some(1));
        assert!(book.active_for_seat(1, 11).is_none());
        assert_eq!(book.active_seats(2).collect::<Vec<_>>(), vec![12]);
        assert_eq!(book.active_seats(3).count(), 0);
    }

    #[test]
    fn test_all_for_user_includes_canceled() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        ledger.append(1, 10, 100, t).unwrap();
        ledger.append(1, 11, 200, t).unwrap();
        let r = ledger.append(2, 10, 100, t).unwrap();
        ledger.cancel(r.id, t).unwrap();

        let ids: Vec<ReservationId> = ledger.all_for(100).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(ledger.all_for(999).is_empty());
    }

    #[test]
    fn test_ordering_by_reserved_at() {
        let ledger = ReservationLedger::new();
        let t = now_micros();

        ledger.append(1, 10, 100, t + Duration::seconds(3)).unwrap();
        ledger.append(2, 10, 100, t + Duration::seconds(1)).unwrap();
        ledger.append(1, 11, 100, t + Duration::seconds(2)).unwrap();

        let ids: Vec<ReservationId> =
            ledger.all_ordered_by_reserved_at().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let ids: Vec<ReservationId> =
            ledger.all_for_event_ordered(1).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_bulk_load() {
        let t = now_micros();
        let row = |id, sheet_id, canceled: bool| Reservation {
            id,
            event_id: 1,
            sheet_id,
            user_id: 7,
            reserved_at: t,
            canceled_at: canceled.then_some(t),
        };

        let ledger = ReservationLedger::new();
        ledger
            .bulk_load(vec![row(1, 10, true), row(2, 10, false), row(3, 11, false)])
            .unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.active_for(1).len(), 2);
        assert_eq!(ledger.append(1, 12, 7, t).unwrap().id, 4);

        let ledger = ReservationLedger::new();
        assert!(matches!(
            ledger.bulk_load(vec![row(1, 10, false), row(3, 11, false)]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ledger.bulk_load(vec![row(1, 10, false), row(2, 10, false)]),
            Err(Error::SeatTaken { .. })
        ));
        assert!(ledger.is_empty());
    }
}
