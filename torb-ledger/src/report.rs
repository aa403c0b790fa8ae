//! Sales reports and per-user activity
//!
//! Everything here works on snapshots handed over by the box office; no
//! ledger lock is held while rows are joined, sorted or written out.

use crate::{
    catalog::SheetCatalog,
    projection::ProjectedEvent,
    types::{Event, EventId, Rank, Reservation, ReservationId, UserId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

/// Timestamp layout of report rows (microseconds, literal `Z`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Column names of the sales CSV, in order
pub const SALES_HEADER: [&str; 8] = [
    "reservation_id",
    "event_id",
    "rank",
    "num",
    "price",
    "user_id",
    "sold_at",
    "canceled_at",
];

/// Entries shown in each "recent" list of the activity summary
pub const RECENT_LIMIT: usize = 5;

/// One line of a sales report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesRow {
    /// Reservation id
    pub reservation_id: ReservationId,
    /// Event id
    pub event_id: EventId,
    /// Seat rank
    pub rank: Rank,
    /// Seat number within the rank
    pub num: i64,
    /// Event price + rank delta
    pub price: i64,
    /// Buyer
    pub user_id: UserId,
    /// `reserved_at` in [`TIMESTAMP_FORMAT`]
    pub sold_at: String,
    /// `canceled_at` in [`TIMESTAMP_FORMAT`], empty while active
    pub canceled_at: String,
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn event_for(events: &HashMap<EventId, Event>, id: EventId) -> Result<&Event> {
    events.get(&id).ok_or_else(|| Error::event_not_found(id))
}

/// Join reservations with their events and seats
///
/// Rows come back ascending by the `sold_at` string. Equal strings keep
/// their input order.
pub fn sales_rows(
    reservations: &[Reservation],
    events: &HashMap<EventId, Event>,
    catalog: &SheetCatalog,
) -> Result<Vec<SalesRow>> {
    let mut rows = reservations
        .iter()
        .map(|r| -> Result<SalesRow> {
            let event = event_for(events, r.event_id)?;
            let seat = catalog.seat(r.sheet_id)?;
            Ok(SalesRow {
                reservation_id: r.id,
                event_id: r.event_id,
                rank: seat.rank,
                num: seat.num,
                price: event.price + seat.price,
                user_id: r.user_id,
                sold_at: format_timestamp(&r.reserved_at),
                canceled_at: r
                    .canceled_at
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    rows.sort_by(|a, b| a.sold_at.cmp(&b.sold_at));
    Ok(rows)
}

/// Write rows as CSV, header line always included
pub fn write_csv<W: Write>(rows: &[SalesRow], out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);

    writer.write_record(SALES_HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A reservation as shown on the user's page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentReservation {
    /// Reservation id
    pub id: ReservationId,
    /// The event, without occupancy
    pub event: Event,
    /// Seat rank
    pub sheet_rank: Rank,
    /// Seat number within the rank
    pub sheet_num: i64,
    /// Price paid
    pub price: i64,
    /// Unix seconds
    pub reserved_at: i64,
    /// Unix seconds, if canceled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<i64>,
}

/// Activity summary of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    /// User id
    pub id: UserId,
    /// Latest reservations, newest first
    pub recent_reservations: Vec<RecentReservation>,
    /// Sum of prices of active reservations
    pub total_price: i64,
    /// Latest events the user touched, without seat detail
    pub recent_events: Vec<ProjectedEvent>,
}

fn newest_first(reservations: &[Reservation]) -> Vec<&Reservation> {
    let mut rows: Vec<&Reservation> = reservations.iter().collect();
    rows.sort_by(|a, b| b.effective_at().cmp(&a.effective_at()));
    rows
}

/// Latest `limit` reservations by effective timestamp, newest first
pub fn recent_reservations(
    reservations: &[Reservation],
    events: &HashMap<EventId, Event>,
    catalog: &SheetCatalog,
    limit: usize,
) -> Result<Vec<RecentReservation>> {
    newest_first(reservations)
        .into_iter()
        .take(limit)
        .map(|r| -> Result<RecentReservation> {
            let event = event_for(events, r.event_id)?;
            let seat = catalog.seat(r.sheet_id)?;
            Ok(RecentReservation {
                id: r.id,
                event: event.clone(),
                sheet_rank: seat.rank,
                sheet_num: seat.num,
                price: event.price + seat.price,
                reserved_at: r.reserved_at.timestamp(),
                canceled_at: r.canceled_at.map(|t| t.timestamp()),
            })
        })
        .collect()
}

/// Sum of prices over active reservations
pub fn total_price(
    reservations: &[Reservation],
    events: &HashMap<EventId, Event>,
    catalog: &SheetCatalog,
) -> Result<i64> {
    reservations
        .iter()
        .filter(|r| r.is_active())
        .try_fold(0, |sum, r| -> Result<i64> {
            let event = event_for(events, r.event_id)?;
            let seat = catalog.seat(r.sheet_id)?;
            Ok(sum + event.price + seat.price)
        })
}

/// Events ordered by the latest effective timestamp of the user's
/// reservations on them, newest first, at most `limit`
pub fn recent_event_ids(reservations: &[Reservation], limit: usize) -> Vec<EventId> {
    let mut latest: HashMap<EventId, DateTime<Utc>> = HashMap::new();
    for r in reservations {
        let at = r.effective_at();
        latest
            .entry(r.event_id)
            .and_modify(|current| {
                if at > *current {
                    *current = at;
                }
            })
            .or_insert(at);
    }

    let mut ids: Vec<(EventId, DateTime<Utc>)> = latest.into_iter().collect();
    ids.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ids.into_iter().take(limit).map(|(id, _)| id).collect()
}
