//! Background durable writer
//!
//! Ledger mutations are mirrored to the store by a single writer task:
//! - Callers hand over a [`WriteCommand`] with a non-blocking `try_send`
//!   and never wait for the store
//! - The writer drains commands in arrival order and applies them in
//!   batches (size or timeout, whichever comes first)
//! - A failed batch is replayed one command at a time, so one bad command
//!   only loses itself; a command that fails on its own is logged and
//!   counted, never retried
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            BoxOffice (request handlers)               │
//! │   commit under ledger lock → WriterHandle::persist_*  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded, try_send)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              WriterActor (Single Task)                │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Batch: Vec<WriteCommand>                       │  │
//! │  │ Timer: 10ms or 100 commands → flush_batch()    │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │              Store::apply(batch)                      │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Durability gap
//!
//! Between an in-memory commit and the end of the batch that carries it,
//! the store lags the ledger. A crash in that window, a store error, or a
//! full queue loses the write durably; the in-memory state stays
//! authoritative until the process exits.

use crate::{
    metrics::Metrics,
    storage::{Store, WriteCommand},
    types::{Event, Reservation, ReservationId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};

/// Message sent to the writer actor
#[derive(Debug)]
pub enum WriterMessage {
    /// Mirror one mutation
    Persist(WriteCommand),

    /// Apply everything queued so far, then answer
    Flush {
        response: oneshot::Sender<()>,
    },

    /// Flush and stop
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Actor that owns the store connection
pub struct WriterActor {
    /// Store backend
    store: Arc<dyn Store>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<WriterMessage>,

    /// Current batch of commands
    batch: Vec<WriteCommand>,

    /// Maximum batch size (commands)
    max_batch_size: usize,

    /// Batch timeout
    batch_timeout: Duration,

    /// Failure and batch counters
    metrics: Metrics,
}

impl WriterActor {
    /// Create new actor
    pub fn new(
        store: Arc<dyn Store>,
        mailbox: mpsc::Receiver<WriterMessage>,
        max_batch_size: usize,
        batch_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            mailbox,
            batch: Vec::with_capacity(max_batch_size),
            max_batch_size,
            batch_timeout,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut batch_timer = interval(self.batch_timeout);
        batch_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(msg) = self.mailbox.recv() => {
                    match msg {
                        WriterMessage::Persist(command) => {
                            self.batch.push(command);
                            if self.batch.len() >= self.max_batch_size {
                                self.flush_batch().await;
                            }
                        }
                        WriterMessage::Flush { response } => {
                            self.flush_batch().await;
                            let _ = response.send(());
                        }
                        WriterMessage::Shutdown { response } => {
                            self.flush_batch().await;
                            let _ = response.send(());
                            break;
                        }
                    }
                }

                // Batch timeout expired
                _ = batch_timer.tick(), if !self.batch.is_empty() => {
                    self.flush_batch().await;
                }

                // Mailbox closed
                else => {
                    self.flush_batch().await;
                    break;
                }
            }
        }

        tracing::info!("Durable writer stopped");
    }

    /// Apply the current batch; on failure fall back to one command at a time
    async fn flush_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.batch);
        self.metrics.record_batch_flush(batch.len());
        tracing::debug!("Flushing batch of {} commands", batch.len());

        match self.store.apply(&batch).await {
            Ok(()) => {}
            Err(e) if batch.len() == 1 => self.record_lost(&batch[0], &e),
            Err(e) => {
                tracing::warn!(
                    "Batch of {} commands failed ({}), applying one at a time",
                    batch.len(),
                    e
                );
                for command in &batch {
                    if let Err(e) = self.store.apply(std::slice::from_ref(command)).await {
                        self.record_lost(command, &e);
                    }
                }
            }
        }

        self.batch.reserve(self.max_batch_size);
    }

    fn record_lost(&self, command: &WriteCommand, error: &Error) {
        tracing::error!(kind = command.kind(), ?command, "Durable write lost: {}", error);
        self.metrics.record_persist_failure(1);
    }
}

impl std::fmt::Debug for WriterActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterActor")
            .field("pending", &self.batch.len())
            .field("max_batch_size", &self.max_batch_size)
            .field("batch_timeout", &self.batch_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle for sending commands to the writer
#[derive(Debug, Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriterMessage>,
    metrics: Metrics,
}

impl WriterHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<WriterMessage>, metrics: Metrics) -> Self {
        Self { sender, metrics }
    }

    fn enqueue(&self, command: WriteCommand) {
        let kind = command.kind();
        match self.sender.try_send(WriterMessage::Persist(command)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(kind, "Writer queue full, durable write dropped");
                self.metrics.record_persist_dropped();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(kind, "Writer stopped, durable write dropped");
                self.metrics.record_persist_dropped();
            }
        }
    }

    /// Mirror a newly created event
    pub fn persist_new_event(&self, event: &Event) {
        self.enqueue(WriteCommand::InsertEvent(event.clone()));
    }

    /// Mirror a new reservation
    pub fn persist_new_reservation(&self, reservation: &Reservation) {
        self.enqueue(WriteCommand::InsertReservation(reservation.clone()));
    }

    /// Mirror a cancellation
    pub fn persist_cancellation(&self, id: ReservationId, canceled_at: DateTime<Utc>) {
        self.enqueue(WriteCommand::CancelReservation { id, canceled_at });
    }

    /// Mirror new visibility flags
    pub fn persist_visibility(&self, event: &Event) {
        self.enqueue(WriteCommand::UpdateVisibility {
            id: event.id,
            public: event.public,
            closed: event.closed,
        });
    }

    /// Wait until everything queued before this call has been applied
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterMessage::Flush { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Flush and stop the writer
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the writer actor on the current runtime
pub fn spawn_writer(
    store: Arc<dyn Store>,
    queue_capacity: usize,
    max_batch_size: usize,
    batch_timeout: Duration,
    metrics: Metrics,
) -> WriterHandle {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let actor = WriterActor::new(store, rx, max_batch_size, batch_timeout, metrics.clone());

    tokio::spawn(async move {
        actor.run().await;
    });

    WriterHandle::new(tx, metrics)
}
