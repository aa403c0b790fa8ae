//! Box office orchestration layer
//!
//! Ties the catalog, both ledgers, the durable writer and metrics together
//! into the operations the HTTP layer calls.
//!
//! # Lock discipline
//!
//! - Acquisition order is reload gate, then at most one ledger lock. Every
//!   mutation holds the gate shared for its whole critical section;
//!   [`BoxOffice::reload`] holds it exclusively from the writer flush to the
//!   last ledger swap. A mutation that finds the gate taken fails with
//!   [`Error::Unavailable`] instead of blocking the worker thread that may be
//!   driving the reload.
//! - The event lock and the reservation lock are never held together. An
//!   operation copies what it needs out of one ledger, drops the guard, then
//!   takes the other.
//! - Every mutation enqueues its [`WriteCommand`](crate::storage::WriteCommand)
//!   before its guard is dropped. The enqueue is a non-blocking `try_send`,
//!   so the writer sees commands in commit order without any caller waiting
//!   on the store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use torb_ledger::{storage::MemoryStore, BoxOffice, Config, Metrics};
//!
//! #[tokio::main]
//! async fn main() -> torb_ledger::Result<()> {
//!     let office = BoxOffice::open(
//!         &Config::default(),
//!         Arc::new(MemoryStore::new()),
//!         Metrics::new().expect("metrics"),
//!     )
//!     .await?;
//!
//!     let event = office.create_event("Opening night", true, 1000)?;
//!     let receipt = office.reserve(event.id, "S", 42)?;
//!     office.cancel(event.id, "S", receipt.sheet_num, 42)?;
//!
//!     office.shutdown().await
//! }
//! ```

use crate::{
    allocator::claim,
    catalog::SheetCatalog,
    config::Config,
    events::{EventBook, EventLedger},
    metrics::Metrics,
    projection::{project, ProjectedEvent, PublicEvent},
    report::{self, SalesRow, UserActivity, RECENT_LIMIT},
    reservations::{ReservationBook, ReservationLedger},
    storage::Store,
    types::{now_micros, Event, EventId, Rank, Reservation, ReservationId, UserId},
    visibility::check_transition,
    writer::{spawn_writer, WriterHandle},
    Error, Result,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock as GateLock, RwLockReadGuard as GateGuard};
use tokio::time::Duration;
use tracing::{info, warn};

/// Longest accepted event title, in characters (`VARCHAR(128)`)
pub const MAX_TITLE_LEN: usize = 128;

/// Highest accepted base price (`INTEGER UNSIGNED`)
pub const MAX_PRICE: i64 = u32::MAX as i64;

/// Answer to a successful reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationReceipt {
    /// New reservation id
    pub id: ReservationId,
    /// Rank of the seat
    pub sheet_rank: Rank,
    /// Seat number within the rank
    pub sheet_num: i64,
}

/// Box office
pub struct BoxOffice {
    /// Static seat layout
    catalog: Arc<SheetCatalog>,

    /// Events
    events: EventLedger,

    /// Reservations
    reservations: ReservationLedger,

    /// Background write-back
    writer: WriterHandle,

    /// Counters and histograms
    metrics: Metrics,

    /// Store read at boot and on reload
    store: Arc<dyn Store>,

    /// Shared by mutations, exclusive during reload
    reload_gate: GateLock<()>,
}

impl BoxOffice {
    /// Open with the standard seat layout
    pub async fn open(config: &Config, store: Arc<dyn Store>, metrics: Metrics) -> Result<Self> {
        Self::with_catalog(config, store, metrics, SheetCatalog::standard()).await
    }

    /// Open with a custom seat layout
    ///
    /// Loads both ledgers from the store, then starts the writer.
    pub async fn with_catalog(
        config: &Config,
        store: Arc<dyn Store>,
        metrics: Metrics,
        catalog: SheetCatalog,
    ) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let (event_book, reservation_book) = load_books(store.as_ref(), &catalog).await?;

        let events = EventLedger::new();
        events.replace(event_book);
        let reservations = ReservationLedger::new();
        reservations.replace(reservation_book);

        let writer = spawn_writer(
            store.clone(),
            config.writer.queue_capacity,
            config.writer.max_batch_size,
            Duration::from_millis(config.writer.batch_timeout_ms),
            metrics.clone(),
        );

        info!(
            events = events.len(),
            reservations = reservations.len(),
            seats = catalog.total(),
            "Box office opened"
        );

        Ok(Self {
            catalog,
            events,
            reservations,
            writer,
            metrics,
            store,
            reload_gate: GateLock::new(()),
        })
    }

    /// Create an event; it starts open, public or not as requested
    pub fn create_event(&self, title: &str, public: bool, price: i64) -> Result<ProjectedEvent> {
        validate_new_event(title, price)?;

        let _gate = self.mutation_gate()?;
        let event = {
            let mut book = self.events.write();
            let event = book.create(title, public, price);
            self.writer.persist_new_event(&event);
            event
        };

        self.metrics.record_event_created();
        info!(event_id = event.id, public, price, "Event created");

        Ok(project(&event, &[], &self.catalog, None))
    }

    /// Full view of any event, seat detail included
    pub fn event(&self, id: EventId, viewer: Option<UserId>) -> Result<ProjectedEvent> {
        let event = self.events.get(id)?;
        let active = self.reservations.active_for(id);
        Ok(project(&event, &active, &self.catalog, viewer))
    }

    /// Public view of a public event
    ///
    /// Non-public events are reported as missing.
    pub fn public_event(&self, id: EventId, viewer: Option<UserId>) -> Result<PublicEvent> {
        let view = self.event(id, viewer)?;
        if !view.public {
            return Err(Error::event_not_found(id));
        }
        Ok(view.sanitized())
    }

    /// Listing views (no seat detail), ascending id
    pub fn events(&self, include_private: bool) -> Vec<ProjectedEvent> {
        let events = self.events.list(include_private);
        let active: Vec<Vec<Reservation>> = {
            let book = self.reservations.lock();
            events.iter().map(|e| book.active_for(e.id)).collect()
        };

        events
            .iter()
            .zip(active)
            .map(|(event, active)| project(event, &active, &self.catalog, None).without_detail())
            .collect()
    }

    /// Public listing
    pub fn public_events(&self) -> Vec<PublicEvent> {
        self.events(false)
            .into_iter()
            .map(ProjectedEvent::sanitized)
            .collect()
    }

    /// Change an event's visibility flags under the visibility policy
    pub fn edit_event(&self, id: EventId, public: bool, closed: bool) -> Result<ProjectedEvent> {
        let gate = self.mutation_gate()?;
        let event = {
            let mut book = self.events.write();
            let current = book.get(id)?;
            if let Err(e) = check_transition(current, public, closed) {
                warn!(event_id = id, public, closed, "Visibility change rejected: {}", e);
                return Err(e);
            }
            let event = book.set_visibility(id, public, closed)?;
            self.writer.persist_visibility(&event);
            event
        };
        drop(gate);

        info!(event_id = id, public, closed, "Event visibility changed");
        self.event(event.id, None)
    }

    /// Reserve a random free seat of `rank_label` for `user_id`
    pub fn reserve(
        &self,
        event_id: EventId,
        rank_label: &str,
        user_id: UserId,
    ) -> Result<ReservationReceipt> {
        let _gate = self.mutation_gate()?;
        let event = self.public_event_row(event_id)?;
        let rank: Rank = rank_label.parse()?;

        let started = Instant::now();
        let claimed = {
            let mut book = self.reservations.lock();
            let mut rng = rand::thread_rng();
            let claimed = claim(
                &mut book,
                &self.catalog,
                event.id,
                rank,
                user_id,
                now_micros(),
                &mut rng,
            );
            if let Ok((reservation, _)) = &claimed {
                self.writer.persist_new_reservation(reservation);
            }
            claimed
        };

        match claimed {
            Ok((reservation, seat)) => {
                self.metrics
                    .record_reservation(started.elapsed().as_secs_f64());
                Ok(ReservationReceipt {
                    id: reservation.id,
                    sheet_rank: seat.rank,
                    sheet_num: seat.num,
                })
            }
            Err(e @ Error::SoldOut { .. }) => {
                self.metrics.record_sold_out();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the caller's reservation of seat (`rank_label`, `num`)
    pub fn cancel(
        &self,
        event_id: EventId,
        rank_label: &str,
        num: i64,
        user_id: UserId,
    ) -> Result<Reservation> {
        let _gate = self.mutation_gate()?;
        let event = self.public_event_row(event_id)?;
        let rank: Rank = rank_label.parse()?;
        let seat = *self.catalog.seat_by_num(rank, num)?;

        let canceled = {
            let mut book = self.reservations.lock();
            let (reservation_id, owner) = book
                .active_for_seat(event.id, seat.id)
                .map(|r| (r.id, r.user_id))
                .ok_or(Error::NotReserved {
                    event_id: event.id,
                    sheet_id: seat.id,
                })?;
            if owner != user_id {
                return Err(Error::Forbidden(format!(
                    "reservation {} belongs to another user",
                    reservation_id
                )));
            }

            let canceled_at = now_micros();
            let canceled = book.cancel(reservation_id, canceled_at)?;
            self.writer.persist_cancellation(reservation_id, canceled_at);
            canceled
        };

        self.metrics.record_cancellation();
        Ok(canceled)
    }

    /// Activity summary of `user_id`
    pub fn user_activity(&self, user_id: UserId) -> Result<UserActivity> {
        // Reservations first: every event they point at is then in the
        // event snapshot taken after.
        let reservations = self.reservations.all_for(user_id);
        let events = self.event_map();

        let recent_reservations =
            report::recent_reservations(&reservations, &events, &self.catalog, RECENT_LIMIT)?;
        let total_price = report::total_price(&reservations, &events, &self.catalog)?;
        let recent_events = report::recent_event_ids(&reservations, RECENT_LIMIT)
            .into_iter()
            .map(|id| self.event(id, None).map(ProjectedEvent::without_detail))
            .collect::<Result<Vec<_>>>()?;

        Ok(UserActivity {
            id: user_id,
            recent_reservations,
            total_price,
            recent_events,
        })
    }

    /// Sales rows of one event
    pub fn sales_report(&self, event_id: EventId) -> Result<Vec<SalesRow>> {
        let event = self.events.get(event_id)?;
        let reservations = self.reservations.all_for_event_ordered(event_id);
        let events = HashMap::from([(event.id, event)]);
        report::sales_rows(&reservations, &events, &self.catalog)
    }

    /// Sales rows of every event
    pub fn sales_report_all(&self) -> Result<Vec<SalesRow>> {
        let reservations = self.reservations.all_ordered_by_reserved_at();
        let events = self.event_map();
        report::sales_rows(&reservations, &events, &self.catalog)
    }

    /// Drain the writer, then re-read both ledgers from the store
    ///
    /// Mutations are refused until both ledgers are swapped. On failure both
    /// ledgers keep their previous contents.
    pub async fn reload(&self) -> Result<()> {
        let _gate = self.reload_gate.write().await;
        self.writer.flush().await?;
        let (event_book, reservation_book) =
            load_books(self.store.as_ref(), &self.catalog).await?;
        self.events.replace(event_book);
        self.reservations.replace(reservation_book);
        info!("Ledgers reloaded from store");
        Ok(())
    }

    /// Wait until every queued write has reached the store
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    /// Flush and stop the writer
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down box office");
        self.writer.shutdown().await
    }

    /// Seat layout
    pub fn catalog(&self) -> &SheetCatalog {
        &self.catalog
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of reservation rows, canceled included
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Event open for reservations: present, public and not closed
    fn public_event_row(&self, id: EventId) -> Result<Event> {
        match self.events.get(id) {
            Ok(event) if event.public && !event.closed => Ok(event),
            Ok(_) | Err(Error::NotFound { .. }) => Err(Error::InvalidEvent(id)),
            Err(e) => Err(e),
        }
    }

    fn mutation_gate(&self) -> Result<GateGuard<'_, ()>> {
        self.reload_gate.try_read().map_err(|_| {
            warn!("Mutation refused during reload");
            Error::Unavailable("ledgers are reloading".to_string())
        })
    }

    fn event_map(&self) -> HashMap<EventId, Event> {
        self.events
            .list(true)
            .into_iter()
            .map(|e| (e.id, e))
            .collect()
    }
}

impl std::fmt::Debug for BoxOffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxOffice")
            .field("events", &self.events.len())
            .field("reservations", &self.reservations.len())
            .field("seats", &self.catalog.total())
            .finish_non_exhaustive()
    }
}

fn validate_new_event(title: &str, price: i64) -> Result<()> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "title longer than {} characters",
            MAX_TITLE_LEN
        )));
    }
    if !(0..=MAX_PRICE).contains(&price) {
        return Err(Error::Validation(format!("price {} out of range", price)));
    }
    Ok(())
}

/// Read both tables and check that every row fits the catalog
async fn load_books(
    store: &dyn Store,
    catalog: &SheetCatalog,
) -> Result<(EventBook, ReservationBook)> {
    let events = store.load_events().await?;
    let reservations = store.load_reservations().await?;

    for r in &reservations {
        if r.event_id <= 0 || r.event_id > events.len() as EventId {
            return Err(Error::Config(format!(
                "reservation {} points at unknown event {}",
                r.id, r.event_id
            )));
        }
        catalog.seat(r.sheet_id).map_err(|_| {
            Error::Config(format!(
                "reservation {} points at unknown seat {}",
                r.id, r.sheet_id
            ))
        })?;
    }

    Ok((
        EventBook::from_rows(events)?,
        ReservationBook::from_rows(reservations)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, WriteCommand};
    use crate::types::SheetConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn tiny_catalog() -> SheetCatalog {
        SheetCatalog::new(&[
            (Rank::S, SheetConfig { first_id: 1, count: 2, price: 300 }),
            (Rank::A, SheetConfig { first_id: 3, count: 2, price: 200 }),
            (Rank::B, SheetConfig { first_id: 5, count: 1, price: 100 }),
            (Rank::C, SheetConfig { first_id: 6, count: 1, price: 0 }),
        ])
        .unwrap()
    }

    async fn office_with(store: Arc<MemoryStore>) -> BoxOffice {
        BoxOffice::with_catalog(
            &Config::default(),
            store,
            Metrics::new().unwrap(),
            tiny_catalog(),
        )
        .await
        .unwrap()
    }

    async fn office() -> BoxOffice {
        office_with(Arc::new(MemoryStore::new())).await
    }

    #[tokio::test]
    async fn test_create_event_starts_empty() {
        let office = office().await;
        let view = office.create_event("first", true, 1000).unwrap();

        assert_eq!(view.id, 1);
        assert_eq!(view.total, 6);
        assert_eq!(view.remains, 6);
        assert_eq!(view.rank_price(Rank::S), Some(1300));
        for rank in Rank::ALL {
            let detail = view.sheets[&rank].detail.as_ref().unwrap();
            assert!(detail.iter().all(|seat| !seat.reserved));
        }
        assert_eq!(office.metrics().events_created_total.get(), 1);
    }

    #[tokio::test]
    async fn test_reserve_requires_public_event() {
        let office = office().await;
        office.create_event("draft", false, 0).unwrap();

        assert!(matches!(office.reserve(1, "S", 1), Err(Error::InvalidEvent(1))));
        assert!(matches!(office.reserve(2, "S", 1), Err(Error::InvalidEvent(2))));
        assert!(matches!(office.cancel(2, "S", 1, 1), Err(Error::InvalidEvent(2))));
    }

    #[tokio::test]
    async fn test_reserve_rejects_closed_row_with_public_flag() {
        let event = Event { id: 1, title: "x".into(), public: true, closed: true, price: 0 };
        let store = Arc::new(MemoryStore::with_rows(vec![event], vec![]));
        let office = office_with(store).await;

        assert!(matches!(office.reserve(1, "S", 1), Err(Error::InvalidEvent(1))));
        assert!(matches!(office.cancel(1, "S", 1, 1), Err(Error::InvalidEvent(1))));
        assert_eq!(office.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_create_event_validates_fields() {
        let office = office().await;

        let long_title = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(
            office.create_event(&long_title, true, 0),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            office.create_event("show", true, -1),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            office.create_event("show", true, MAX_PRICE + 1),
            Err(Error::Validation(_))
        ));
        assert_eq!(office.event_count(), 0);

        let title = "é".repeat(MAX_TITLE_LEN);
        assert_eq!(office.create_event(&title, true, MAX_PRICE).unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_reserve_rejects_unknown_rank() {
        let office = office().await;
        office.create_event("show", true, 0).unwrap();

        assert!(matches!(office.reserve(1, "Z", 1), Err(Error::InvalidRank(_))));
        assert_eq!(office.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_reserve_until_sold_out() {
        let office = office().await;
        office.create_event("show", true, 1000).unwrap();

        let a = office.reserve(1, "S", 10).unwrap();
        let b = office.reserve(1, "S", 11).unwrap();
        let mut nums = vec![a.sheet_num, b.sheet_num];
        nums.sort_unstable();
        assert_eq!(nums, vec![1, 2]);
        assert_eq!(a.sheet_rank, Rank::S);

        assert!(matches!(office.reserve(1, "S", 12), Err(Error::SoldOut { .. })));
        assert_eq!(office.reservation_count(), 2);
        assert_eq!(office.metrics().sold_out_total.get(), 1);

        let view = office.event(1, Some(10)).unwrap();
        assert_eq!(view.sheets[&Rank::S].remains, 0);
        assert_eq!(view.remains, 4);
        let mine = view.sheets[&Rank::S]
            .detail
            .as_ref()
            .unwrap()
            .iter()
            .filter(|seat| seat.mine)
            .count();
        assert_eq!(mine, 1);
    }

    #[tokio::test]
    async fn test_cancel_checks() {
        let office = office().await;
        office.create_event("show", true, 0).unwrap();
        let receipt = office.reserve(1, "C", 10).unwrap();
        assert_eq!(receipt.sheet_num, 1);

        assert!(matches!(office.cancel(1, "C", 2, 10), Err(Error::OutOfRange(2))));
        assert!(matches!(office.cancel(1, "B", 1, 10), Err(Error::NotReserved { .. })));
        assert!(matches!(office.cancel(1, "C", 1, 99), Err(Error::Forbidden(_))));

        let canceled = office.cancel(1, "C", 1, 10).unwrap();
        assert_eq!(canceled.id, receipt.id);
        assert!(canceled.canceled_at.is_some());

        assert!(matches!(office.cancel(1, "C", 1, 10), Err(Error::NotReserved { .. })));
        assert_eq!(office.event(1, None).unwrap().remains, 6);
    }

    #[tokio::test]
    async fn test_edit_event_policy() {
        let office = office().await;
        office.create_event("show", false, 0).unwrap();

        assert!(matches!(
            office.edit_event(1, true, true),
            Err(Error::InvalidVisibility(1))
        ));
        assert!(office.edit_event(1, true, false).unwrap().public);
        assert!(matches!(
            office.edit_event(1, false, true),
            Err(Error::CannotClosePublic(1))
        ));
        assert!(!office.edit_event(1, false, false).unwrap().public);
        assert!(office.edit_event(1, false, true).unwrap().closed);
        assert!(matches!(
            office.edit_event(1, true, false),
            Err(Error::EventClosed(1))
        ));
    }

    #[tokio::test]
    async fn test_listing_hides_private_and_detail() {
        let office = office().await;
        office.create_event("public", true, 0).unwrap();
        office.create_event("draft", false, 0).unwrap();

        let public = office.public_events();
        assert_eq!(public.len(), 1);
        assert!(public[0].sheets.values().all(|view| view.detail.is_none()));

        assert_eq!(office.events(true).len(), 2);
        assert!(matches!(office.public_event(2, None), Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_user_activity() {
        let office = office().await;
        office.create_event("one", true, 1000).unwrap();
        office.create_event("two", true, 2000).unwrap();

        office.reserve(1, "C", 7).unwrap();
        office.reserve(2, "S", 7).unwrap();
        let second = office.reserve(2, "S", 7).unwrap();
        office.cancel(2, "S", second.sheet_num, 7).unwrap();
        office.reserve(1, "B", 8).unwrap();

        let activity = office.user_activity(7).unwrap();
        assert_eq!(activity.id, 7);
        let mut ids: Vec<ReservationId> =
            activity.recent_reservations.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, second.id]);
        assert_eq!(activity.total_price, 1000 + 2300);
        let mut recent: Vec<EventId> = activity.recent_events.iter().map(|e| e.id).collect();
        recent.sort_unstable();
        assert_eq!(recent, vec![1, 2]);
        assert!(activity
            .recent_events
            .iter()
            .all(|e| e.sheets.values().all(|view| view.detail.is_none())));
    }

    #[tokio::test]
    async fn test_sales_reports() {
        let office = office().await;
        office.create_event("one", true, 1000).unwrap();
        office.create_event("two", true, 2000).unwrap();
        office.reserve(1, "S", 7).unwrap();
        office.reserve(2, "C", 8).unwrap();

        let one = office.sales_report(1).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].price, 1300);

        let all = office.sales_report_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].sold_at <= all[1].sold_at);

        assert!(matches!(office.sales_report(9), Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_writes_reach_store_and_reload() {
        let store = Arc::new(MemoryStore::new());
        let office = office_with(store.clone()).await;
        office.create_event("show", true, 500).unwrap();
        let receipt = office.reserve(1, "A", 3).unwrap();
        office.cancel(1, "A", receipt.sheet_num, 3).unwrap();
        office.edit_event(1, false, false).unwrap();

        office.reload().await.unwrap();

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].public);
        assert!(store.reservations()[0].canceled_at.is_some());

        assert_eq!(office.event_count(), 1);
        assert_eq!(office.reservation_count(), 1);
        assert_eq!(office.event(1, None).unwrap().remains, 6);

        office.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_rows_outside_catalog() {
        let event = Event { id: 1, title: "x".into(), public: true, closed: false, price: 0 };
        let reservation = Reservation {
            id: 1,
            event_id: 1,
            sheet_id: 99,
            user_id: 1,
            reserved_at: now_micros(),
            canceled_at: None,
        };
        let store = Arc::new(MemoryStore::with_rows(vec![event], vec![reservation]));

        let opened = BoxOffice::with_catalog(
            &Config::default(),
            store,
            Metrics::new().unwrap(),
            tiny_catalog(),
        )
        .await;
        assert!(matches!(opened, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_writes_do_not_affect_requests() {
        let store = Arc::new(MemoryStore::new());
        let office = office_with(store.clone()).await;
        store.set_failing(true);

        office.create_event("show", true, 0).unwrap();
        office.reserve(1, "S", 1).unwrap();
        office.flush().await.unwrap();

        assert!(store.events().is_empty());
        assert_eq!(office.event(1, None).unwrap().remains, 5);
        assert!(office.metrics().persist_failures_total.get() >= 2);
    }

    /// Store whose `load_events` can be held open
    #[derive(Default)]
    struct PausingStore {
        inner: MemoryStore,
        pause: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Store for PausingStore {
        async fn load_events(&self) -> Result<Vec<Event>> {
            if self.pause.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.load_events().await
        }

        async fn load_reservations(&self) -> Result<Vec<Reservation>> {
            self.inner.load_reservations().await
        }

        async fn apply(&self, batch: &[WriteCommand]) -> Result<()> {
            self.inner.apply(batch).await
        }
    }

    #[tokio::test]
    async fn test_mutations_refused_while_reloading() {
        let store = Arc::new(PausingStore::default());
        let office = Arc::new(
            BoxOffice::with_catalog(
                &Config::default(),
                store.clone(),
                Metrics::new().unwrap(),
                tiny_catalog(),
            )
            .await
            .unwrap(),
        );
        office.create_event("a", true, 0).unwrap();
        let receipt = office.reserve(1, "S", 1).unwrap();

        store.pause.store(true, Ordering::SeqCst);
        let reloading = tokio::spawn({
            let office = office.clone();
            async move { office.reload().await }
        });
        store.entered.notified().await;

        // Snapshot taken, swap pending: nothing may commit now
        assert!(matches!(office.create_event("b", true, 0), Err(Error::Unavailable(_))));
        assert!(matches!(office.reserve(1, "S", 2), Err(Error::Unavailable(_))));
        assert!(matches!(
            office.cancel(1, "S", receipt.sheet_num, 1),
            Err(Error::Unavailable(_))
        ));
        assert!(matches!(office.edit_event(1, false, false), Err(Error::Unavailable(_))));
        assert_eq!(office.event(1, None).unwrap().remains, 5);

        store.pause.store(false, Ordering::SeqCst);
        store.release.notify_one();
        reloading.await.unwrap().unwrap();

        assert_eq!(office.event_count(), 1);
        assert_eq!(office.reservation_count(), 1);
        assert_eq!(office.create_event("b", true, 0).unwrap().id, 2);
        assert_eq!(office.reserve(1, "S", 2).unwrap().id, 2);
        office.flush().await.unwrap();

        let titles: Vec<String> = store.inner.events().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(store.inner.reservations().len(), 2);
        assert_eq!(office.metrics().persist_failures_total.get(), 0);

        office.shutdown().await.unwrap();
    }
}
