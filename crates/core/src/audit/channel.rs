//! Non-blocking audit pipeline: cloneable handles feed a bounded channel that
//! a single background writer drains into an [`AuditStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{AuditEvent, AuditRecord, AuditStore};
use crate::metrics::{AUDIT_EVENTS_DROPPED, AUDIT_EVENTS_WRITTEN};

/// Upper bound on how many queued events are written in one transaction.
const MAX_BATCH: usize = 64;

/// Envelope wrapping an audit event with metadata
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

impl AuditEventEnvelope {
    fn into_record(self) -> AuditRecord {
        AuditRecord {
            id: 0, // assigned by the store
            timestamp: self.timestamp,
            event_type: self.event.event_type().to_string(),
            ticket_id: self.event.ticket_id().map(String::from),
            user_id: self.event.user_id().map(String::from),
            data: self.event,
        }
    }
}

/// Handle for emitting audit events
///
/// Cheap to clone. Emission never fails the caller: a full or closed channel
/// is logged and counted, and the event is dropped.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    fn envelope(event: AuditEvent) -> AuditEventEnvelope {
        AuditEventEnvelope {
            timestamp: Utc::now(),
            event,
        }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.tx.send(Self::envelope(event)).await {
            AUDIT_EVENTS_DROPPED
                .with_label_values(&["channel_closed"])
                .inc();
            tracing::error!(event_type = e.0.event.event_type(), "Audit channel closed");
        }
    }

    /// Emit without waiting. Returns whether the event was queued.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        match self.tx.try_send(Self::envelope(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(envelope)) => {
                AUDIT_EVENTS_DROPPED.with_label_values(&["channel_full"]).inc();
                tracing::warn!(
                    event_type = envelope.event.event_type(),
                    "Audit channel full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                AUDIT_EVENTS_DROPPED
                    .with_label_values(&["channel_closed"])
                    .inc();
                tracing::error!(
                    event_type = envelope.event.event_type(),
                    "Audit channel closed"
                );
                false
            }
        }
    }
}

/// Background task that receives audit events and writes them to storage
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every handle is dropped.
    ///
    /// Events already queued are drained in batches, so a burst costs one
    /// transaction instead of one per event.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        let mut batch = Vec::with_capacity(MAX_BATCH);
        while let Some(envelope) = self.rx.recv().await {
            batch.push(envelope.into_record());
            while batch.len() < MAX_BATCH {
                match self.rx.try_recv() {
                    Ok(envelope) => batch.push(envelope.into_record()),
                    Err(_) => break,
                }
            }
            self.flush(&mut batch);
        }

        tracing::info!("Audit writer shutting down");
    }

    fn flush(&self, batch: &mut Vec<AuditRecord>) {
        let count = batch.len() as u64;
        match self.store.insert_batch(batch.as_slice()) {
            Ok(()) => AUDIT_EVENTS_WRITTEN.inc_by(count),
            Err(e) => {
                AUDIT_EVENTS_DROPPED
                    .with_label_values(&["store_error"])
                    .inc_by(count);
                tracing::error!(error = %e, count, "Failed to write audit events");
            }
        }
        batch.clear();
    }
}

/// Create a complete audit system
///
/// Returns the handle to clone into services and the writer to spawn with
/// `tokio::spawn(writer.run())`.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
