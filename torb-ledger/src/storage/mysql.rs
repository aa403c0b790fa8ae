//! MySQL store (sqlx)
//!
//! Schema: `sql/schema.sql`. Id columns are unsigned in the schema and are
//! cast to signed on the way out so they decode straight into `i64`.
//! `DATETIME(6)` columns hold naive UTC.

use super::{Store, WriteCommand};
use crate::{
    config::DatabaseConfig,
    types::{Event, Reservation},
    Result,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::info;

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    title: String,
    public_fg: i64,
    closed_fg: i64,
    price: i64,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            public: row.public_fg != 0,
            closed: row.closed_fg != 0,
            price: row.price,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    event_id: i64,
    sheet_id: i64,
    user_id: i64,
    reserved_at: NaiveDateTime,
    canceled_at: Option<NaiveDateTime>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            event_id: row.event_id,
            sheet_id: row.sheet_id,
            user_id: row.user_id,
            reserved_at: row.reserved_at.and_utc(),
            canceled_at: row.canceled_at.map(|t| t.and_utc()),
        }
    }
}

/// Relational store over a MySQL pool
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect and verify the pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!("Database connection verified");

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn load_events(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT CAST(id AS SIGNED) AS id,
                   title,
                   CAST(public_fg AS SIGNED) AS public_fg,
                   CAST(closed_fg AS SIGNED) AS closed_fg,
                   CAST(price AS SIGNED) AS price
            FROM events
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn load_reservations(&self) -> Result<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT CAST(id AS SIGNED) AS id,
                   CAST(event_id AS SIGNED) AS event_id,
                   CAST(sheet_id AS SIGNED) AS sheet_id,
                   CAST(user_id AS SIGNED) AS user_id,
                   reserved_at,
                   canceled_at
            FROM reservations
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reservation::from).collect())
    }

    async fn apply(&self, batch: &[WriteCommand]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for command in batch {
            match command {
                WriteCommand::InsertEvent(event) => {
                    sqlx::query(
                        "INSERT INTO events (id, title, public_fg, closed_fg, price) VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(event.id)
                    .bind(&event.title)
                    .bind(event.public)
                    .bind(event.closed)
                    .bind(event.price)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteCommand::InsertReservation(reservation) => {
                    sqlx::query(
                        "INSERT INTO reservations (id, event_id, sheet_id, user_id, reserved_at) VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(reservation.id)
                    .bind(reservation.event_id)
                    .bind(reservation.sheet_id)
                    .bind(reservation.user_id)
                    .bind(reservation.reserved_at.naive_utc())
                    .execute(&mut *tx)
                    .await?;
                }
                WriteCommand::CancelReservation { id, canceled_at } => {
                    sqlx::query("UPDATE reservations SET canceled_at = ? WHERE id = ?")
                        .bind(canceled_at.naive_utc())
                        .bind(*id)
                        .execute(&mut *tx)
                        .await?;
                }
                WriteCommand::UpdateVisibility { id, public, closed } => {
                    sqlx::query("UPDATE events SET public_fg = ?, closed_fg = ? WHERE id = ?")
                        .bind(*public)
                        .bind(*closed)
                        .bind(*id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_reservation_row_is_utc() {
        let reserved_at = NaiveDate::from_ymd_opt(2018, 9, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 0, 123_456)
            .unwrap();
        let row = ReservationRow {
            id: 1,
            event_id: 2,
            sheet_id: 3,
            user_id: 4,
            reserved_at,
            canceled_at: None,
        };

        let reservation = Reservation::from(row);
        assert_eq!(reservation.reserved_at.naive_utc(), reserved_at);
        assert!(reservation.canceled_at.is_none());
    }

    #[test]
    fn test_event_row_flags() {
        let event = Event::from(EventRow {
            id: 1,
            title: "t".to_string(),
            public_fg: 1,
            closed_fg: 0,
            price: 500,
        });
        assert!(event.public);
        assert!(!event.closed);
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_database_round_trip() {
        let config = DatabaseConfig::default();
        let store = MySqlStore::connect(&config).await.unwrap();
        let events = store.load_events().await.unwrap();
        let reservations = store.load_reservations().await.unwrap();
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.id, i as i64 + 1);
        }
        for (i, reservation) in reservations.iter().enumerate() {
            assert_eq!(reservation.id, i as i64 + 1);
        }
    }
}
