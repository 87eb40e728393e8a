//! Queue between the limiter and the durable [`RateLimitLog`].
//!
//! Admission only enqueues; a background [`MirrorWriter`] applies the writes.
//! Ordering per key is preserved because a single writer drains the queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::RateLimitLog;
use crate::metrics::RATE_LIMIT_MIRROR_DROPPED;

/// Default queue depth for [`create_mirror`].
pub const DEFAULT_MIRROR_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MirrorOp {
    Record {
        key: String,
        fresh_window: bool,
        at: DateTime<Utc>,
    },
    Forget {
        key: String,
    },
}

/// Cloneable sender side of the mirror queue.
#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::Sender<MirrorOp>,
}

impl MirrorHandle {
    /// Queue an admitted attempt without waiting. Returns whether it was queued.
    pub fn record(&self, key: &str, fresh_window: bool, at: DateTime<Utc>) -> bool {
        let op = MirrorOp::Record {
            key: key.to_string(),
            fresh_window,
            at,
        };
        match self.tx.try_send(op) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                RATE_LIMIT_MIRROR_DROPPED
                    .with_label_values(&["channel_full"])
                    .inc();
                tracing::warn!(key = %key, "Rate limit mirror queue full, dropping attempt");
                false
            }
            Err(TrySendError::Closed(_)) => {
                RATE_LIMIT_MIRROR_DROPPED
                    .with_label_values(&["channel_closed"])
                    .inc();
                tracing::error!(key = %key, "Rate limit mirror queue closed");
                false
            }
        }
    }

    /// Queue removal of a key, behind any attempts already queued for it.
    pub async fn forget(&self, key: &str) {
        let op = MirrorOp::Forget {
            key: key.to_string(),
        };
        if self.tx.send(op).await.is_err() {
            RATE_LIMIT_MIRROR_DROPPED
                .with_label_values(&["channel_closed"])
                .inc();
            tracing::error!(key = %key, "Rate limit mirror queue closed");
        }
    }
}

/// Drains the mirror queue into a [`RateLimitLog`].
pub struct MirrorWriter {
    rx: mpsc::Receiver<MirrorOp>,
    log: Arc<dyn RateLimitLog>,
}

impl MirrorWriter {
    /// Apply queued writes until every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("Rate limit mirror writer started");
        while let Some(op) = self.rx.recv().await {
            self.apply(op);
        }
        tracing::debug!("Rate limit mirror writer stopped");
    }

    fn apply(&self, op: MirrorOp) {
        let (key, result) = match op {
            MirrorOp::Record {
                key,
                fresh_window,
                at,
            } => {
                let result = self.log.record(&key, fresh_window, at);
                (key, result)
            }
            MirrorOp::Forget { key } => {
                let result = self.log.forget(&key);
                (key, result)
            }
        };
        if let Err(e) = result {
            RATE_LIMIT_MIRROR_DROPPED
                .with_label_values(&["store_error"])
                .inc();
            tracing::error!(key = %key, error = %e, "Failed to mirror rate limit attempt");
        }
    }
}

/// Build the mirror queue. Spawn the writer with `tokio::spawn(writer.run())`.
pub fn create_mirror(
    log: Arc<dyn RateLimitLog>,
    buffer_size: usize,
) -> (MirrorHandle, MirrorWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (MirrorHandle { tx }, MirrorWriter { rx, log })
}
