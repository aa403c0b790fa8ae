//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: remaining seats + active reservations == seats in the house
//! - Occupancy: at most one active reservation per (event, seat)
//! - Allocation: a claimed seat is always inside the requested rank
//! - Cancellation: a second cancel of the same row is refused

use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::HashSet;
use torb_ledger::{
    allocator::claim,
    projection::project,
    reservations::ReservationBook,
    types::{now_micros, Event, SheetConfig},
    Error, Rank, SheetCatalog,
};

const EVENTS: i64 = 3;

/// Ledger operation
#[derive(Debug, Clone)]
enum Op {
    Reserve { event_id: i64, rank: Rank, user_id: i64 },
    Cancel { pick: usize },
}

/// Strategy for generating ranks
fn rank_strategy() -> impl Strategy<Value = Rank> {
    prop_oneof![Just(Rank::S), Just(Rank::A), Just(Rank::B), Just(Rank::C)]
}

/// Strategy for generating operations (reserve-heavy so ranks fill up)
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..=EVENTS, rank_strategy(), 1i64..5).prop_map(|(event_id, rank, user_id)| {
            Op::Reserve { event_id, rank, user_id }
        }),
        1 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
    ]
}

fn small_catalog() -> SheetCatalog {
    SheetCatalog::new(&[
        (Rank::S, SheetConfig { first_id: 1, count: 3, price: 500 }),
        (Rank::A, SheetConfig { first_id: 4, count: 4, price: 300 }),
        (Rank::B, SheetConfig { first_id: 8, count: 2, price: 100 }),
        (Rank::C, SheetConfig { first_id: 10, count: 5, price: 0 }),
    ])
    .unwrap()
}

fn event(id: i64) -> Event {
    Event {
        id,
        title: format!("event {}", id),
        public: true,
        closed: false,
        price: 1000,
    }
}

/// Replay operations against a fresh book
fn replay(ops: &[Op], catalog: &SheetCatalog, seed: u64) -> ReservationBook {
    let mut book = ReservationBook::default();
    let mut rng = StdRng::seed_from_u64(seed);

    for op in ops {
        match op {
            Op::Reserve { event_id, rank, user_id } => {
                let before = book.len();
                match claim(&mut book, catalog, *event_id, *rank, *user_id, now_micros(), &mut rng) {
                    Ok((reservation, seat)) => {
                        assert_eq!(seat.rank, *rank);
                        assert_eq!(reservation.sheet_id, seat.id);
                    }
                    Err(Error::SoldOut { .. }) => assert_eq!(book.len(), before),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            Op::Cancel { pick } => {
                if book.is_empty() {
                    continue;
                }
                let id = (*pick % book.len()) as i64 + 1;
                let was_active = book.get(id).unwrap().is_active();
                match book.cancel(id, now_micros()) {
                    Ok(row) => {
                        assert!(was_active);
                        assert!(row.canceled_at.is_some());
                    }
                    Err(Error::AlreadyCanceled(_)) => assert!(!was_active),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }
    }

    book
}

proptest! {
    /// Property: remaining + active == total for every event
    #[test]
    fn prop_conservation(ops in prop::collection::vec(op_strategy(), 1..200), seed in any::<u64>()) {
        let catalog = small_catalog();
        let book = replay(&ops, &catalog, seed);

        for event_id in 1..=EVENTS {
            let active = book.active_for(event_id);
            let view = project(&event(event_id), &active, &catalog, None);

            prop_assert_eq!(view.remains + active.len() as i64, catalog.total());
            let by_rank: i64 = view.sheets.values().map(|r| r.remains).sum();
            prop_assert_eq!(by_rank, view.remains);
        }
    }

    /// Property: no seat is actively held twice for one event
    #[test]
    fn prop_single_active_per_seat(ops in prop::collection::vec(op_strategy(), 1..200), seed in any::<u64>()) {
        let catalog = small_catalog();
        let book = replay(&ops, &catalog, seed);

        let mut held = HashSet::new();
        for id in 1..=book.len() as i64 {
            let row = book.get(id).unwrap();
            if row.is_active() {
                prop_assert!(held.insert((row.event_id, row.sheet_id)));
            }
        }
        for event_id in 1..=EVENTS {
            prop_assert_eq!(book.active_count(event_id), book.active_for(event_id).len());
        }
    }

    /// Property: a rank fills up exactly at its seat count
    #[test]
    fn prop_rank_fills_at_count(rank in rank_strategy(), seed in any::<u64>()) {
        let catalog = small_catalog();
        let (first_id, count) = catalog.range_for(rank);
        let mut book = ReservationBook::default();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut taken = HashSet::new();
        for _ in 0..count {
            let (_, seat) = claim(&mut book, &catalog, 1, rank, 1, now_micros(), &mut rng).unwrap();
            prop_assert!(seat.id >= first_id && seat.id < first_id + count);
            prop_assert!(taken.insert(seat.id));
        }

        let refused = claim(&mut book, &catalog, 1, rank, 1, now_micros(), &mut rng);
        prop_assert!(matches!(refused, Err(Error::SoldOut { .. })), "expected SoldOut");
        prop_assert_eq!(book.len(), count as usize);
    }

    /// Property: canceling twice is refused and leaves the row untouched
    #[test]
    fn prop_double_cancel_refused(rank in rank_strategy(), seed in any::<u64>()) {
        let catalog = small_catalog();
        let mut book = ReservationBook::default();
        let mut rng = StdRng::seed_from_u64(seed);

        let (reservation, _) = claim(&mut book, &catalog, 2, rank, 9, now_micros(), &mut rng).unwrap();
        let first = book.cancel(reservation.id, now_micros()).unwrap();

        let second = book.cancel(reservation.id, now_micros());
        prop_assert!(matches!(second, Err(Error::AlreadyCanceled(_))), "expected AlreadyCanceled");
        prop_assert_eq!(book.get(reservation.id).unwrap().canceled_at, first.canceled_at);
        prop_assert_eq!(book.active_count(2), 0);
    }
}
