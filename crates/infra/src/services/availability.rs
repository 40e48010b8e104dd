use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use socialstore_events::{EventBus, EventEnvelope};
use socialstore_kits::{Kit, KitId, LineAvailability, availability_details, check_availability};
use socialstore_stock::ProductId;

use super::Context;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

/// Kit availability against current stock. Point-in-time; nothing is reserved.
pub struct AvailabilityChecker<'a, S, B> {
    ctx: &'a Context<S, B>,
}

impl<'a, S, B> AvailabilityChecker<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: &'a Context<S, B>) -> Self {
        Self { ctx }
    }

    /// True iff every item's product exists, is active and has enough stock.
    pub fn check_availability(&self, kit: &Kit) -> ServiceResult<bool> {
        let lookup = self
            .ctx
            .product_lookup(kit.items().iter().map(|i| i.product_id))
            .context("failed to check kit availability")?;
        Ok(check_availability(kit.items(), &lookup))
    }

    pub fn availability_details(
        &self,
        kit: &Kit,
    ) -> ServiceResult<BTreeMap<ProductId, LineAvailability>> {
        let lookup = self
            .ctx
            .product_lookup(kit.items().iter().map(|i| i.product_id))
            .context("failed to check kit availability")?;
        Ok(availability_details(kit.items(), &lookup))
    }

    pub fn check_kit(&self, kit_id: KitId) -> ServiceResult<bool> {
        let kit = self
            .ctx
            .kit(kit_id)
            .context("failed to check kit availability")?;
        self.check_availability(&kit)
    }

    pub fn kit_availability_details(
        &self,
        kit_id: KitId,
    ) -> ServiceResult<BTreeMap<ProductId, LineAvailability>> {
        let kit = self
            .ctx
            .kit(kit_id)
            .context("failed to check kit availability")?;
        self.availability_details(&kit)
    }
}
