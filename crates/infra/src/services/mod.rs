//! Application services: the operations collaborators and beneficiaries call.
//!
//! Every service reads aggregates straight from the event store (never from a
//! projection), decides through the aggregates, and commits through the
//! [`CommandDispatcher`]. Cross-aggregate rules live here: beneficiary and
//! kit activity, stock availability, and the stock deduction on confirmation.
//!
//! Writes that can race (stock movements, delivery transitions) run inside
//! [`Context::with_retries`]: on a version conflict the whole attempt is
//! re-loaded and re-decided, up to `max_conflict_retries` times. Business
//! failures are returned on the first attempt.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use socialstore_beneficiaries::{Beneficiary, BeneficiaryId};
use socialstore_core::DomainError;
use socialstore_deliveries::{Delivery, DeliveryId};
use socialstore_events::{EventBus, EventEnvelope};
use socialstore_kits::{Kit, KitId, ProductSnapshot};
use socialstore_stock::{Product, ProductId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::StoreConfig;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

pub mod availability;
pub mod catalog;
pub mod custom_kits;
pub mod deliveries;
pub mod stock_ledger;

pub use availability::AvailabilityChecker;
pub use catalog::{Catalog, KitDraft, KitItemRequest, ProductDetails};
pub use custom_kits::CustomKits;
pub use deliveries::Deliveries;
pub use stock_ledger::StockLedger;

pub(crate) fn make_product(id: socialstore_core::AggregateId) -> Product {
    Product::empty(ProductId::new(id))
}

pub(crate) fn make_kit(id: socialstore_core::AggregateId) -> Kit {
    Kit::empty(KitId::new(id))
}

pub(crate) fn make_beneficiary(id: socialstore_core::AggregateId) -> Beneficiary {
    Beneficiary::empty(BeneficiaryId::new(id))
}

pub(crate) fn make_delivery(id: socialstore_core::AggregateId) -> Delivery {
    Delivery::empty(DeliveryId::new(id))
}

/// State shared by all services of one store.
#[derive(Debug)]
pub struct Context<S, B> {
    pub(crate) dispatcher: CommandDispatcher<S, B>,
    pub(crate) config: StoreConfig,
}

impl<S, B> Context<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>, config: StoreConfig) -> Self {
        Self { dispatcher, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Run `attempt` until it commits, fails for a business reason, or has hit
    /// a version conflict more than `max_conflict_retries` times.
    pub(crate) fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Result<T, DispatchError>,
    ) -> ServiceResult<T> {
        let max = self.config.max_conflict_retries;
        let mut retries = 0u32;

        loop {
            match attempt() {
                Err(DispatchError::Concurrency(msg)) if retries < max => {
                    retries += 1;
                    debug!(operation, retries, reason = %msg, "version conflict, retrying");
                }
                Err(DispatchError::Concurrency(msg)) => {
                    warn!(operation, retries, "version conflict persisted after retries");
                    return Err(DispatchError::Concurrency(msg)).context(operation);
                }
                Err(DispatchError::Domain(e)) => {
                    debug!(operation, error = %e, "operation rejected");
                    return Err(e.into());
                }
                other => return other.context(operation),
            }
        }
    }

    pub(crate) fn product(&self, id: ProductId) -> Result<Product, DispatchError> {
        let product = self.dispatcher.load(id.0, make_product)?;
        if !product.exists() {
            return Err(DomainError::not_found(format!("product {id}")).into());
        }
        Ok(product)
    }

    pub(crate) fn kit(&self, id: KitId) -> Result<Kit, DispatchError> {
        let kit = self.dispatcher.load(id.0, make_kit)?;
        if !kit.exists() {
            return Err(DomainError::not_found(format!("kit {id}")).into());
        }
        Ok(kit)
    }

    /// A kit that may be used for new deliveries and custom kits.
    pub(crate) fn active_kit(&self, id: KitId) -> Result<Kit, DispatchError> {
        let kit = self.kit(id)?;
        if !kit.is_active() {
            return Err(DomainError::validation(format!("kit {} is not active", kit.name())).into());
        }
        Ok(kit)
    }

    pub(crate) fn beneficiary(&self, id: BeneficiaryId) -> Result<Beneficiary, DispatchError> {
        let beneficiary = self.dispatcher.load(id.0, make_beneficiary)?;
        if !beneficiary.exists() {
            return Err(DomainError::not_found(format!("beneficiary {id}")).into());
        }
        Ok(beneficiary)
    }

    pub(crate) fn delivery(&self, id: DeliveryId) -> Result<Delivery, DispatchError> {
        let delivery = self.dispatcher.load(id.0, make_delivery)?;
        if !delivery.exists() {
            return Err(DomainError::not_found(format!("delivery {id}")).into());
        }
        Ok(delivery)
    }

    /// Current stock snapshot of the given products. Unknown ids are left out,
    /// so availability checks report them as missing.
    pub(crate) fn product_lookup(
        &self,
        ids: impl IntoIterator<Item = ProductId>,
    ) -> Result<HashMap<ProductId, ProductSnapshot>, DispatchError> {
        let mut lookup = HashMap::new();
        for id in ids {
            if lookup.contains_key(&id) {
                continue;
            }
            let product = self.dispatcher.load(id.0, make_product)?;
            if product.exists() {
                lookup.insert(id, ProductSnapshot::from(&product));
            }
        }
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;

    use socialstore_events::InMemoryEventBus;

    use crate::error::ServiceError;
    use crate::event_store::InMemoryEventStore;

    fn context(retries: u32) -> Context<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
        Context::new(
            CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new())),
            StoreConfig::default().with_max_conflict_retries(retries),
        )
    }

    #[test]
    fn conflicts_are_retried_until_success() {
        let ctx = context(3);
        let calls = Cell::new(0);

        let out = ctx.with_retries("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(DispatchError::Concurrency("moved".to_string()))
            } else {
                Ok(calls.get())
            }
        });

        assert_eq!(out.unwrap(), 3);
    }

    #[test]
    fn exhausted_retries_become_a_conflict() {
        let ctx = context(2);
        let calls = Cell::new(0);

        let err = ctx
            .with_retries("test", || -> Result<(), DispatchError> {
                calls.set(calls.get() + 1);
                Err(DispatchError::Concurrency("moved".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(err.is_retryable());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn business_failures_are_not_retried() {
        let ctx = context(5);
        let calls = Cell::new(0);

        let err = ctx
            .with_retries("test", || -> Result<(), DispatchError> {
                calls.set(calls.get() + 1);
                Err(DomainError::validation("no").into())
            })
            .unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn missing_entities_are_not_found() {
        let ctx = context(0);
        let err = ctx
            .product(ProductId::new(socialstore_core::AggregateId::new()))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::NotFound(_))));
    }
}
