//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and keep query-friendly state.
//! All projections are:
//! - **Rebuildable**: can be reconstructed from [`EventStore::load_all`](crate::event_store::EventStore::load_all)
//! - **Idempotent**: a per-stream cursor drops replays and duplicates

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use thiserror::Error;

use socialstore_core::AggregateId;
use socialstore_events::EventEnvelope;

pub mod aggregates;
pub mod stock_movements;

pub use aggregates::AggregateProjection;
pub use stock_movements::StockMovementsProjection;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: String,
        message: String,
    },

    #[error("non-monotonic sequence number for {aggregate_id} (last={last}, found={found})")]
    NonMonotonicSequence {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },
}

/// A read model fed from published envelopes.
pub trait Projection: Send + 'static {
    type Row: Clone + Send + 'static;

    /// Apply one envelope. Returns whether the visible rows changed.
    fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError>;

    /// Current rows in a stable order.
    fn rows(&self) -> Vec<Self::Row>;
}

/// Per-stream sequence cursors for at-least-once delivery.
#[derive(Debug, Default)]
pub(crate) struct Cursors {
    last: HashMap<AggregateId, u64>,
}

impl Cursors {
    /// `Ok(true)` when the envelope is the next one for its stream, `Ok(false)`
    /// for a duplicate/replay, and an error for a gap.
    pub(crate) fn admit(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.last.get(&aggregate_id).copied().unwrap_or(0);

        if seq <= last {
            return Ok(false);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                aggregate_id,
                last,
                found: seq,
            });
        }
        Ok(true)
    }

    /// Advance after a successful apply.
    pub(crate) fn advance(&mut self, envelope: &EventEnvelope<JsonValue>) {
        self.last
            .insert(envelope.aggregate_id(), envelope.sequence_number());
    }
}
