//! Wiring: one event store, one bus, the services on top and the live views
//! beside them.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

use socialstore_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::CommandDispatcher;
use crate::config::StoreConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::live_view::LiveViewError;
use crate::services::{AvailabilityChecker, Catalog, Context, CustomKits, Deliveries, StockLedger};
use crate::views::LiveViews;

pub type InMemoryBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// The in-memory store used by tests, benches and local runs.
pub type InMemorySocialStore = SocialStore<Arc<InMemoryEventStore>, InMemoryBus>;

pub struct SocialStore<S, B> {
    ctx: Context<S, B>,
    views: LiveViews,
}

impl SocialStore<Arc<InMemoryEventStore>, InMemoryBus> {
    pub fn in_memory(config: StoreConfig) -> Result<Self, LiveViewError> {
        Self::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()), config)
    }
}

impl<S, B> SocialStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Start the live views (replaying whatever `store` already holds) and
    /// expose the services over `store` and `bus`.
    pub fn new(store: S, bus: B, config: StoreConfig) -> Result<Self, LiveViewError> {
        let views = LiveViews::start(&store, &bus)?;
        info!(
            utc_offset = %config.utc_offset,
            max_conflict_retries = config.max_conflict_retries,
            "social store started"
        );
        Ok(Self {
            ctx: Context::new(CommandDispatcher::new(store, bus), config),
            views,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        self.ctx.config()
    }

    pub fn catalog(&self) -> Catalog<'_, S, B> {
        Catalog::new(&self.ctx)
    }

    pub fn stock(&self) -> StockLedger<'_, S, B> {
        StockLedger::new(&self.ctx)
    }

    pub fn availability(&self) -> AvailabilityChecker<'_, S, B> {
        AvailabilityChecker::new(&self.ctx)
    }

    pub fn deliveries(&self) -> Deliveries<'_, S, B> {
        Deliveries::new(&self.ctx)
    }

    pub fn custom_kits(&self) -> CustomKits<'_, S, B> {
        CustomKits::new(&self.ctx)
    }

    pub fn views(&self) -> &LiveViews {
        &self.views
    }

    pub fn event_store(&self) -> &S {
        self.ctx.dispatcher().store()
    }

    pub fn event_bus(&self) -> &B {
        self.ctx.dispatcher().bus()
    }
}
