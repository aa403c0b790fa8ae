//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for the box office.
//!
//! # Metrics
//!
//! - `torb_reservations_total` - Seats reserved
//! - `torb_cancellations_total` - Reservations canceled
//! - `torb_sold_out_total` - Reservation attempts refused as sold out
//! - `torb_events_created_total` - Events created
//! - `torb_persist_failures_total` - Durable writes lost to store errors
//! - `torb_persist_dropped_total` - Durable writes lost to a full queue
//! - `torb_writer_batch_size` - Histogram of writer batch sizes
//! - `torb_allocation_duration_seconds` - Time spent under the reservation lock

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Seats reserved
    pub reservations_total: IntCounter,

    /// Reservations canceled
    pub cancellations_total: IntCounter,

    /// Sold-out refusals
    pub sold_out_total: IntCounter,

    /// Events created
    pub events_created_total: IntCounter,

    /// Commands lost to store errors
    pub persist_failures_total: IntCounter,

    /// Commands lost to a full writer queue
    pub persist_dropped_total: IntCounter,

    /// Writer batch size histogram
    pub writer_batch_size: Histogram,

    /// Allocation critical-section duration histogram
    pub allocation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let reservations_total =
            IntCounter::new("torb_reservations_total", "Seats reserved")?;
        registry.register(Box::new(reservations_total.clone()))?;

        let cancellations_total =
            IntCounter::new("torb_cancellations_total", "Reservations canceled")?;
        registry.register(Box::new(cancellations_total.clone()))?;

        let sold_out_total = IntCounter::new(
            "torb_sold_out_total",
            "Reservation attempts refused as sold out",
        )?;
        registry.register(Box::new(sold_out_total.clone()))?;

        let events_created_total =
            IntCounter::new("torb_events_created_total", "Events created")?;
        registry.register(Box::new(events_created_total.clone()))?;

        let persist_failures_total = IntCounter::new(
            "torb_persist_failures_total",
            "Durable writes lost to store errors",
        )?;
        registry.register(Box::new(persist_failures_total.clone()))?;

        let persist_dropped_total = IntCounter::new(
            "torb_persist_dropped_total",
            "Durable writes lost to a full writer queue",
        )?;
        registry.register(Box::new(persist_dropped_total.clone()))?;

        let writer_batch_size = Histogram::with_opts(
            HistogramOpts::new("torb_writer_batch_size", "Histogram of writer batch sizes")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        )?;
        registry.register(Box::new(writer_batch_size.clone()))?;

        let allocation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "torb_allocation_duration_seconds",
                "Time spent allocating a seat under the reservation lock",
            )
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(allocation_duration.clone()))?;

        Ok(Self {
            reservations_total,
            cancellations_total,
            sold_out_total,
            events_created_total,
            persist_failures_total,
            persist_dropped_total,
            writer_batch_size,
            allocation_duration,
            registry,
        })
    }

    /// Record a reservation
    pub fn record_reservation(&self, duration_seconds: f64) {
        self.reservations_total.inc();
        self.allocation_duration.observe(duration_seconds);
    }

    /// Record a sold-out refusal
    pub fn record_sold_out(&self) {
        self.sold_out_total.inc();
    }

    /// Record a cancellation
    pub fn record_cancellation(&self) {
        self.cancellations_total.inc();
    }

    /// Record an event creation
    pub fn record_event_created(&self) {
        self.events_created_total.inc();
    }

    /// Record a flushed writer batch
    pub fn record_batch_flush(&self, batch_size: usize) {
        self.writer_batch_size.observe(batch_size as f64);
    }

    /// Record commands lost to a store error
    pub fn record_persist_failure(&self, commands: usize) {
        self.persist_failures_total.inc_by(commands as u64);
    }

    /// Record a command dropped before reaching the writer
    pub fn record_persist_dropped(&self) {
        self.persist_dropped_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("reservations_total", &self.reservations_total.get())
            .field("cancellations_total", &self.cancellations_total.get())
            .finish_non_exhaustive()
    }
}
