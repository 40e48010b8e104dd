//! Stock queries and stock-adjusting movements.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::info;

use socialstore_core::ActorId;
use socialstore_events::{EventBus, EventEnvelope};
use socialstore_stock::{
    MovementId, MovementType, PRODUCT_AGGREGATE, ProductCommand, ProductEvent, ProductId,
    RecordMovement, StockMovement,
};

use super::Context;
use crate::command_dispatcher::DispatchError;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

pub struct StockLedger<'a, S, B> {
    ctx: &'a Context<S, B>,
}

impl<'a, S, B> StockLedger<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: &'a Context<S, B>) -> Self {
        Self { ctx }
    }

    pub fn get_current_stock(&self, product_id: ProductId) -> ServiceResult<Decimal> {
        let product = self
            .ctx
            .product(product_id)
            .context("failed to read current stock")?;
        Ok(product.current_stock())
    }

    /// Record one movement against the stock as of commit time.
    ///
    /// For `Adjustment` the quantity is the new absolute stock level.
    pub fn apply_movement(
        &self,
        product_id: ProductId,
        movement_type: MovementType,
        quantity: Decimal,
        performed_by: &ActorId,
        reason: &str,
    ) -> ServiceResult<StockMovement> {
        let cmd = ProductCommand::RecordMovement(RecordMovement {
            product_id,
            movement_id: MovementId::new(),
            movement_type,
            quantity,
            performed_by: performed_by.clone(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });

        let movement = self.ctx.with_retries("failed to apply stock movement", || {
            let product = self.ctx.product(product_id)?;
            let decision = self
                .ctx
                .dispatcher
                .decide(&product, product_id.0, PRODUCT_AGGREGATE, &cmd)?;
            let movement = decision
                .events
                .iter()
                .find_map(|e| match e {
                    ProductEvent::StockMoved(moved) => Some(moved.movement.clone()),
                    _ => None,
                })
                .ok_or_else(|| DispatchError::CorruptStream("movement produced no StockMoved event".to_string()))?;
            self.ctx.dispatcher.commit(vec![decision.append])?;
            Ok(movement)
        })?;

        info!(
            product_id = %product_id,
            movement_id = %movement.movement_id,
            movement_type = %movement.movement_type,
            delta = %movement.delta,
            stock_after = %movement.stock_after,
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// The product's audit trail, oldest first.
    pub fn movement_history(&self, product_id: ProductId) -> ServiceResult<Vec<StockMovement>> {
        let context = "failed to load movement history";
        self.ctx.product(product_id).context(context)?;

        let stream = self
            .ctx
            .dispatcher
            .store()
            .load_stream(product_id.0)
            .map_err(DispatchError::from)
            .context(context)?;

        let mut movements = Vec::new();
        for stored in stream {
            let event: ProductEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))
                .context(context)?;
            if let ProductEvent::StockMoved(moved) = event {
                movements.push(moved.movement);
            }
        }
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use socialstore_stock::{MeasureUnit, ProductCategory};

    use crate::error::ServiceError;
    use crate::services::ProductDetails;
    use crate::store::{InMemorySocialStore, SocialStore};

    fn staff() -> ActorId {
        ActorId::new("staff-1")
    }

    fn store_with_product() -> (InMemorySocialStore, ProductId) {
        let store = SocialStore::in_memory(Default::default()).unwrap();
        let product = store
            .catalog()
            .create_product(
                ProductDetails {
                    name: "Beans".to_string(),
                    category: ProductCategory::Food,
                    unit: MeasureUnit::Kilogram,
                    minimum_stock: dec!(1),
                },
                &staff(),
            )
            .unwrap();
        let id = product.id_typed();
        (store, id)
    }

    #[test]
    fn movements_update_stock_and_history() {
        let (store, id) = store_with_product();
        let ledger = store.stock();

        ledger
            .apply_movement(id, MovementType::Entry, dec!(10), &staff(), "donation")
            .unwrap();
        let exit = ledger
            .apply_movement(id, MovementType::Exit, dec!(4), &staff(), "delivery")
            .unwrap();
        let adjust = ledger
            .apply_movement(id, MovementType::Adjustment, dec!(5), &staff(), "recount")
            .unwrap();

        assert_eq!(exit.stock_before, dec!(10));
        assert_eq!(exit.delta, dec!(-4));
        assert_eq!(adjust.delta, dec!(-1));
        assert_eq!(ledger.get_current_stock(id).unwrap(), dec!(5));

        let history = ledger.movement_history(id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].stock_after, dec!(5));
    }

    #[test]
    fn exit_beyond_stock_is_rejected_and_nothing_is_written() {
        let (store, id) = store_with_product();
        let ledger = store.stock();
        ledger
            .apply_movement(id, MovementType::Entry, dec!(2), &staff(), "donation")
            .unwrap();

        let err = ledger
            .apply_movement(id, MovementType::Transfer, dec!(3), &staff(), "to campus B")
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available, requested, .. }
                if available == dec!(2) && requested == dec!(3)
        ));
        assert_eq!(ledger.get_current_stock(id).unwrap(), dec!(2));
        assert_eq!(ledger.movement_history(id).unwrap().len(), 1);
    }

    #[test]
    fn blank_reason_is_a_validation_error() {
        let (store, id) = store_with_product();
        let err = store
            .stock()
            .apply_movement(id, MovementType::Entry, dec!(1), &staff(), "  ")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let (store, _) = store_with_product();
        let missing = ProductId::new(socialstore_core::AggregateId::new());
        assert!(matches!(
            store.stock().get_current_stock(missing),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            store.stock().movement_history(missing),
            Err(ServiceError::NotFound(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

        #[test]
        fn stock_never_goes_negative(ops in prop::collection::vec((0u8..3, 1u32..20), 1..25)) {
            let (store, id) = store_with_product();
            let ledger = store.stock();

            for (kind, qty) in ops {
                let movement_type = match kind {
                    0 => MovementType::Entry,
                    1 => MovementType::Exit,
                    _ => MovementType::Adjustment,
                };
                let before = ledger.get_current_stock(id).unwrap();
                match ledger.apply_movement(id, movement_type, Decimal::from(qty), &staff(), "prop") {
                    Ok(m) => prop_assert_eq!(m.stock_before, before),
                    Err(_) => prop_assert_eq!(ledger.get_current_stock(id).unwrap(), before),
                }
                prop_assert!(ledger.get_current_stock(id).unwrap() >= Decimal::ZERO);
            }
        }
    }
}
