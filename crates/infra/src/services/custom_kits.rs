//! Custom kit building and submission.
//!
//! Editing a [`CustomKit`] is pure and happens on the caller's value; this
//! service only seeds it, validates it against current stock, and turns it
//! into a delivery request.

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use socialstore_beneficiaries::BeneficiaryId;
use socialstore_core::{ActorId, AggregateId};
use socialstore_deliveries::{
    DELIVERY_AGGREGATE, Delivery, DeliveryCommand, DeliveryId, DeliveryLine, KitSource,
    RequestDelivery,
};
use socialstore_events::{EventBus, EventEnvelope};
use socialstore_kits::{CustomKit, KitId, ProductSnapshot};
use socialstore_stock::ProductId;

use super::{Context, make_delivery};
use crate::command_dispatcher::DispatchError;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

pub struct CustomKits<'a, S, B> {
    ctx: &'a Context<S, B>,
}

impl<'a, S, B> CustomKits<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: &'a Context<S, B>) -> Self {
        Self { ctx }
    }

    pub fn start_from_scratch(&self) -> CustomKit {
        CustomKit::from_scratch()
    }

    /// Copy an active kit's items (whole units only) and remember where they came from.
    pub fn start_from_kit(&self, kit_id: KitId) -> ServiceResult<CustomKit> {
        let kit = self
            .ctx
            .active_kit(kit_id)
            .context("failed to start custom kit")?;
        Ok(CustomKit::from_kit(&kit))
    }

    /// What [`CustomKit::add_product`] needs to know about a product.
    pub fn product_snapshot(&self, product_id: ProductId) -> ServiceResult<ProductSnapshot> {
        let product = self
            .ctx
            .product(product_id)
            .context("failed to load product")?;
        Ok(ProductSnapshot::from(&product))
    }

    pub fn validate(&self, custom_kit: &CustomKit) -> ServiceResult<()> {
        self.check(custom_kit).context("failed to validate custom kit")
    }

    /// Re-validate and file the kit as a delivery request awaiting approval.
    pub fn submit(
        &self,
        beneficiary_id: BeneficiaryId,
        custom_kit: &CustomKit,
        notes: &str,
        requested_by: &ActorId,
    ) -> ServiceResult<Delivery> {
        let id = AggregateId::new();

        let delivery = self.ctx.with_retries("failed to submit custom kit", || {
            let beneficiary = self.ctx.beneficiary(beneficiary_id)?;
            beneficiary.ensure_can_receive()?;
            self.check(custom_kit)?;

            let cmd = DeliveryCommand::RequestDelivery(RequestDelivery {
                delivery_id: DeliveryId::new(id),
                beneficiary_id,
                beneficiary_name: beneficiary.name().to_string(),
                kit: KitSource::from_custom(custom_kit),
                lines: custom_kit.items.iter().map(DeliveryLine::from).collect(),
                notes: Some(custom_kit.describe(notes)),
                requested_by: requested_by.clone(),
                occurred_at: Utc::now(),
            });
            self.ctx
                .dispatcher
                .dispatch(id, DELIVERY_AGGREGATE, &cmd, make_delivery)
        })?;

        info!(
            delivery_id = %id,
            beneficiary_id = %beneficiary_id,
            kit_id = %custom_kit.kit_id_label(),
            items = custom_kit.items.len(),
            "custom kit submitted"
        );
        Ok(delivery)
    }

    fn check(&self, custom_kit: &CustomKit) -> Result<(), DispatchError> {
        let lookup = self
            .ctx
            .product_lookup(custom_kit.items.iter().map(|i| i.product_id))?;
        custom_kit.validate(&lookup)?;
        Ok(())
    }
}
