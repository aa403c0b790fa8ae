//! Seat allocation
//!
//! Picks a free seat of a rank uniformly at random. Every free seat is
//! equally likely; there is no lowest-id preference.
//!
//! Both functions take the [`ReservationBook`] by reference, which can only
//! be reached through the reservation ledger's lock guard. [`claim`] appends
//! the chosen seat through the same `&mut` borrow, so no other caller can
//! see or take the seat between choice and append.

use crate::{
    catalog::SheetCatalog,
    reservations::ReservationBook,
    types::{EventId, Rank, Reservation, Seat, SheetId, UserId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};

/// Free seat ids of a rank for an event, ascending
pub fn free_seats(
    book: &ReservationBook,
    catalog: &SheetCatalog,
    event_id: EventId,
    rank: Rank,
) -> Vec<SheetId> {
    let (first_id, count) = catalog.range_for(rank);
    let mut used = vec![false; count as usize];
    for sheet_id in book.active_seats(event_id) {
        if sheet_id >= first_id && sheet_id < first_id + count {
            used[(sheet_id - first_id) as usize] = true;
        }
    }

    used.iter()
        .enumerate()
        .filter(|(_, taken)| !**taken)
        .map(|(offset, _)| first_id + offset as SheetId)
        .collect()
}

/// Choose a free seat of `rank` for `event_id`
pub fn allocate<'c, R: Rng + ?Sized>(
    book: &ReservationBook,
    catalog: &'c SheetCatalog,
    event_id: EventId,
    rank: Rank,
    rng: &mut R,
) -> Result<&'c Seat> {
    let free = free_seats(book, catalog, event_id, rank);
    let sheet_id = free.choose(rng).copied().ok_or_else(|| Error::SoldOut {
        event_id,
        rank: rank.label().to_string(),
    })?;
    catalog.seat(sheet_id)
}

/// Choose a free seat and append the reservation for it
///
/// On `SoldOut` nothing is appended.
pub fn claim<R: Rng + ?Sized>(
    book: &mut ReservationBook,
    catalog: &SheetCatalog,
    event_id: EventId,
    rank: Rank,
    user_id: UserId,
    reserved_at: DateTime<Utc>,
    rng: &mut R,
) -> Result<(Reservation, Seat)> {
    let seat = *allocate(book, catalog, event_id, rank, rng)?;
    let reservation = book.append(event_id, seat.id, user_id, reserved_at)?;
    tracing::debug!(
        event_id,
        sheet_id = seat.id,
        reservation_id = reservation.id,
        "Seat claimed"
    );
    Ok((reservation, seat))
}
