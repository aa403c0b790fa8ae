//! Viewer-aware occupancy view of an event
//!
//! [`project`] joins an event with a snapshot of its active reservations and
//! the static catalog. It is the single computation behind both the detailed
//! event page and the aggregate listing; the listing shape is produced by
//! [`ProjectedEvent::without_detail`] at the boundary.

use crate::{
    catalog::SheetCatalog,
    types::{Event, EventId, Rank, Reservation, SheetId, UserId},
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One seat in the detailed view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatView {
    /// Ordinal within the rank
    pub num: i64,
    /// Held by the viewer
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mine: bool,
    /// Held by anyone
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reserved: bool,
    /// Unix seconds of the holding reservation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<i64>,
}

/// Per-rank aggregate plus optional detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankView {
    /// Seats in the rank
    pub total: i64,
    /// Seats without an active reservation
    pub remains: i64,
    /// Event price + rank delta
    pub price: i64,
    /// Seat detail in ordinal order, `None` once stripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Vec<SeatView>>,
}

/// Event joined with live occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedEvent {
    /// Event id
    pub id: EventId,
    /// Title
    pub title: String,
    /// Public flag
    pub public: bool,
    /// Closed flag
    pub closed: bool,
    /// Base price
    pub price: i64,
    /// Seats in the house
    pub total: i64,
    /// Seats without an active reservation
    pub remains: i64,
    /// Per-rank view keyed by rank label
    pub sheets: BTreeMap<Rank, RankView>,
}

/// Public shape: no price or flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicEvent {
    /// Event id
    pub id: EventId,
    /// Title
    pub title: String,
    /// Seats in the house
    pub total: i64,
    /// Seats without an active reservation
    pub remains: i64,
    /// Per-rank view keyed by rank label
    pub sheets: BTreeMap<Rank, RankView>,
}

impl ProjectedEvent {
    /// Same view with per-seat detail dropped
    pub fn without_detail(mut self) -> Self {
        for view in self.sheets.values_mut() {
            view.detail = None;
        }
        self
    }

    /// Public shape of the view
    pub fn sanitized(self) -> PublicEvent {
        PublicEvent {
            id: self.id,
            title: self.title,
            total: self.total,
            remains: self.remains,
            sheets: self.sheets,
        }
    }

    /// Price of one seat of `rank`
    pub fn rank_price(&self, rank: Rank) -> Option<i64> {
        self.sheets.get(&rank).map(|view| view.price)
    }
}

/// Build the occupancy view of `event`
///
/// `active` must be the event's active reservations. `viewer = None` never
/// marks a seat as mine.
pub fn project(
    event: &Event,
    active: &[Reservation],
    catalog: &SheetCatalog,
    viewer: Option<UserId>,
) -> ProjectedEvent {
    let held: HashMap<SheetId, &Reservation> = active
        .iter()
        .filter(|r| r.event_id == event.id && r.is_active())
        .map(|r| (r.sheet_id, r))
        .collect();

    let mut sheets: BTreeMap<Rank, RankView> = Rank::ALL
        .iter()
        .map(|&rank| {
            let (_, count) = catalog.range_for(rank);
            let view = RankView {
                total: count,
                remains: 0,
                price: catalog.rank_price(rank, event.price),
                detail: Some(Vec::with_capacity(count as usize)),
            };
            (rank, view)
        })
        .collect();

    let mut remains = 0;
    for seat in catalog.seats() {
        let Some(view) = sheets.get_mut(&seat.rank) else {
            continue;
        };
        let seat_view = match held.get(&seat.id) {
            None => {
                remains += 1;
                view.remains += 1;
                SeatView {
                    num: seat.num,
                    mine: false,
                    reserved: false,
                    reserved_at: None,
                }
            }
            Some(reservation) => SeatView {
                num: seat.num,
                mine: viewer == Some(reservation.user_id),
                reserved: true,
                reserved_at: Some(reservation.reserved_at.timestamp()),
            },
        };
        if let Some(detail) = view.detail.as_mut() {
            detail.push(seat_view);
        }
    }

    ProjectedEvent {
        id: event.id,
        title: event.title.clone(),
        public: event.public,
        closed: event.closed,
        price: event.price,
        total: catalog.total(),
        remains,
        sheets,
    }
}
