// Private module declaration
mod replay;

// Re-export for public API
pub use replay::warm_replay;

use std::sync::Arc;
use std::time::Instant;

use crate::cache::OrderCache;
use crate::db::{InsertOutcome, OrderStore, StoreError};
use crate::metrics::Metrics;
use crate::models::Order;

// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
// Per-message state machine:
//
//   received -> decoded -> validated -> persisted -> cached -> acknowledged
//
// with two early exits: Rejected (undecodable payload, empty order_uid)
// and a store error. The pipeline never retries and never acknowledges
// anything itself - it reports the terminal state and the transport layer
// decides whether to commit the message.
//
// After a SkippedDuplicate the cache is still updated, so the cache serves
// the latest received payload while the store keeps the first. That split
// is the documented idempotency policy, not an accident.
// ============================================================================

/// Why a message was dropped without touching the store or the cache.
#[derive(Debug, thiserror::Error)]
pub enum RejectReason {
    #[error("empty payload")]
    EmptyPayload,

    #[error("undecodable payload: {0}")]
    Decode(serde_json::Error),

    #[error("missing order_uid")]
    MissingOrderUid,
}

impl RejectReason {
    /// Stable label for the rejection counter.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::EmptyPayload => "empty_payload",
            RejectReason::Decode(_) => "decode",
            RejectReason::MissingOrderUid => "missing_order_uid",
        }
    }
}

/// Terminal state of one message, short of a store error.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Persisted (or deliberately skipped as a duplicate) and cached;
    /// the message may be acknowledged.
    Accepted {
        order_uid: String,
        persistence: InsertOutcome,
    },
    /// Never persisted, never cached; the message stays unacknowledged.
    Rejected(RejectReason),
}

pub struct IngestPipeline<S> {
    store: S,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
}

impl<S: OrderStore> IngestPipeline<S> {
    pub fn new(store: S, cache: Arc<OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            cache,
            metrics,
        }
    }

    /// Drive one inbound payload through decode -> validate -> persist ->
    /// cache. A store error propagates so the caller leaves the message
    /// unacknowledged; redelivery is the transport's job.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<IngestOutcome, StoreError> {
        let started = Instant::now();

        if payload.is_empty() {
            return Ok(self.reject(RejectReason::EmptyPayload));
        }

        let order: Order = match serde_json::from_slice(payload) {
            Ok(order) => order,
            Err(err) => return Ok(self.reject(RejectReason::Decode(err))),
        };

        if order.order_uid.is_empty() {
            return Ok(self.reject(RejectReason::MissingOrderUid));
        }

        let persistence = match self.store.insert_order(&order).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.metrics.record_failure();
                return Err(err);
            }
        };

        if persistence == InsertOutcome::SkippedDuplicate {
            tracing::debug!(
                order_uid = %order.order_uid,
                "Duplicate order_uid, store kept the first payload"
            );
        }

        // Cache the latest payload even for duplicates.
        let order_uid = order.order_uid.clone();
        self.cache.set(order);
        self.metrics.cache_entries.set(self.cache.len() as i64);

        let outcome = match persistence {
            InsertOutcome::Inserted => "inserted",
            InsertOutcome::SkippedDuplicate => "duplicate",
        };
        self.metrics
            .record_accepted(outcome, started.elapsed().as_secs_f64());

        tracing::info!(order_uid = %order_uid, outcome = outcome, "Order ingested");

        Ok(IngestOutcome::Accepted {
            order_uid,
            persistence,
        })
    }

    fn reject(&self, reason: RejectReason) -> IngestOutcome {
        self.metrics.record_rejected(reason.label());
        tracing::warn!(reason = %reason, "Rejected inbound message");
        IngestOutcome::Rejected(reason)
    }
}
