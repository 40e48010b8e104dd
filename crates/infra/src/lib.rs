//! Infrastructure layer: event store, command pipeline, services, live views, config.
//!
//! [`SocialStore`] wires everything together over any [`EventStore`] and
//! [`EventBus`](socialstore_events::EventBus); [`SocialStore::in_memory`] is
//! the in-process setup used by tests and local runs.

pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod event_store;
pub mod live_view;
pub mod projections;
pub mod services;
pub mod store;
pub mod views;
pub mod workers;

pub use config::{ConfigError, StoreConfig};
pub use error::{ServiceError, ServiceResult};
pub use event_store::{EventStore, InMemoryEventStore};
pub use store::{InMemorySocialStore, SocialStore};

#[cfg(test)]
mod integration_tests;
