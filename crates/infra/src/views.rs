//! The store's live queries, one [`LiveView`] per entity kind.

use serde_json::Value as JsonValue;

use socialstore_beneficiaries::{BENEFICIARY_AGGREGATE, Beneficiary, BeneficiaryId};
use socialstore_deliveries::{DELIVERY_AGGREGATE, Delivery, DeliveryStatus};
use socialstore_events::{EventBus, EventEnvelope, Subscription};
use socialstore_kits::{KIT_AGGREGATE, Kit};
use socialstore_stock::{PRODUCT_AGGREGATE, Product, ProductId, StockMovement};

use crate::event_store::EventStore;
use crate::live_view::{LiveView, LiveViewError};
use crate::projections::{AggregateProjection, StockMovementsProjection};
use crate::services::{make_beneficiary, make_delivery, make_kit, make_product};

pub struct LiveViews {
    products: LiveView<AggregateProjection<Product>>,
    kits: LiveView<AggregateProjection<Kit>>,
    beneficiaries: LiveView<AggregateProjection<Beneficiary>>,
    deliveries: LiveView<AggregateProjection<Delivery>>,
    movements: LiveView<StockMovementsProjection>,
}

impl LiveViews {
    pub fn start<S, B>(store: &S, bus: &B) -> Result<Self, LiveViewError>
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        Ok(Self {
            products: LiveView::start(
                "products-view",
                AggregateProjection::new(PRODUCT_AGGREGATE, make_product),
                store,
                bus,
            )?,
            kits: LiveView::start(
                "kits-view",
                AggregateProjection::new(KIT_AGGREGATE, make_kit),
                store,
                bus,
            )?,
            beneficiaries: LiveView::start(
                "beneficiaries-view",
                AggregateProjection::new(BENEFICIARY_AGGREGATE, make_beneficiary),
                store,
                bus,
            )?,
            deliveries: LiveView::start(
                "deliveries-view",
                AggregateProjection::new(DELIVERY_AGGREGATE, make_delivery),
                store,
                bus,
            )?,
            movements: LiveView::start("movements-view", StockMovementsProjection::new(), store, bus)?,
        })
    }

    // Products

    pub fn watch_products(
        &self,
        filter: impl Fn(&Product) -> bool + Send + 'static,
    ) -> Subscription<Vec<Product>> {
        self.products.watch(filter)
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.snapshot(|_| true)
    }

    /// Active products at or below their minimum stock.
    pub fn watch_low_stock(&self) -> Subscription<Vec<Product>> {
        self.products.watch(is_low_stock)
    }

    pub fn low_stock_products(&self) -> Vec<Product> {
        self.products.snapshot(is_low_stock)
    }

    // Kits

    pub fn watch_kits(&self, filter: impl Fn(&Kit) -> bool + Send + 'static) -> Subscription<Vec<Kit>> {
        self.kits.watch(filter)
    }

    pub fn watch_active_kits(&self) -> Subscription<Vec<Kit>> {
        self.kits.watch(Kit::is_active)
    }

    pub fn kits(&self) -> Vec<Kit> {
        self.kits.snapshot(|_| true)
    }

    // Beneficiaries

    pub fn watch_beneficiaries(
        &self,
        filter: impl Fn(&Beneficiary) -> bool + Send + 'static,
    ) -> Subscription<Vec<Beneficiary>> {
        self.beneficiaries.watch(filter)
    }

    pub fn beneficiaries(&self) -> Vec<Beneficiary> {
        self.beneficiaries.snapshot(|_| true)
    }

    // Deliveries

    pub fn watch_deliveries(
        &self,
        filter: impl Fn(&Delivery) -> bool + Send + 'static,
    ) -> Subscription<Vec<Delivery>> {
        self.deliveries.watch(filter)
    }

    pub fn watch_deliveries_by_status(&self, status: DeliveryStatus) -> Subscription<Vec<Delivery>> {
        self.deliveries.watch(move |d| d.status() == status)
    }

    pub fn watch_deliveries_for_beneficiary(
        &self,
        beneficiary_id: BeneficiaryId,
    ) -> Subscription<Vec<Delivery>> {
        self.deliveries
            .watch(move |d| d.beneficiary_id() == Some(beneficiary_id))
    }

    pub fn deliveries_by_status(&self, status: DeliveryStatus) -> Vec<Delivery> {
        self.deliveries.snapshot(|d| d.status() == status)
    }

    // Stock movements

    pub fn watch_movements(&self, product_id: ProductId) -> Subscription<Vec<StockMovement>> {
        self.movements.watch(move |m| m.product_id == product_id)
    }

    pub fn watch_all_movements(&self) -> Subscription<Vec<StockMovement>> {
        self.movements.watch(|_| true)
    }
}

fn is_low_stock(product: &Product) -> bool {
    product.is_active() && product.is_low_stock()
}
