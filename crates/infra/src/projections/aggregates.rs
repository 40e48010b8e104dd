use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use socialstore_core::{Aggregate, AggregateId};
use socialstore_events::EventEnvelope;

use super::{Cursors, Projection, ProjectionError};

/// Current state of every aggregate of one type, rebuilt by replaying its events.
///
/// Rows are the aggregates themselves, ordered by id (ids are time-ordered
/// UUIDv7, so this is creation order).
pub struct AggregateProjection<A> {
    aggregate_type: &'static str,
    make: fn(AggregateId) -> A,
    items: BTreeMap<AggregateId, A>,
    cursors: Cursors,
}

impl<A> AggregateProjection<A> {
    pub fn new(aggregate_type: &'static str, make: fn(AggregateId) -> A) -> Self {
        Self {
            aggregate_type,
            make,
            items: BTreeMap::new(),
            cursors: Cursors::default(),
        }
    }

    pub fn get(&self, id: AggregateId) -> Option<&A> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<A> Projection for AggregateProjection<A>
where
    A: Aggregate + Clone + Send + 'static,
    A::Event: DeserializeOwned,
{
    type Row = A;

    fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type {
            return Ok(false);
        }
        if !self.cursors.admit(envelope)? {
            return Ok(false);
        }

        let event: A::Event = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: self.aggregate_type.to_string(),
                message: e.to_string(),
            }
        })?;

        let id = envelope.aggregate_id();
        let make = self.make;
        self.items.entry(id).or_insert_with(|| make(id)).apply(&event);
        self.cursors.advance(envelope);
        Ok(true)
    }

    fn rows(&self) -> Vec<A> {
        self.items.values().cloned().collect()
    }
}
