use serde_json::Value as JsonValue;

use socialstore_events::EventEnvelope;
use socialstore_stock::{PRODUCT_AGGREGATE, ProductEvent, StockMovement};

use super::{Cursors, Projection, ProjectionError};

/// Every recorded stock movement across all products, in commit order.
#[derive(Debug, Default)]
pub struct StockMovementsProjection {
    movements: Vec<StockMovement>,
    cursors: Cursors,
}

impl StockMovementsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }
}

impl Projection for StockMovementsProjection {
    type Row = StockMovement;

    fn apply_envelope(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE {
            return Ok(false);
        }
        if !self.cursors.admit(envelope)? {
            return Ok(false);
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: PRODUCT_AGGREGATE.to_string(),
                message: e.to_string(),
            }
        })?;
        self.cursors.advance(envelope);

        match event {
            ProductEvent::StockMoved(moved) => {
                self.movements.push(moved.movement);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn rows(&self) -> Vec<StockMovement> {
        self.movements.clone()
    }
}
