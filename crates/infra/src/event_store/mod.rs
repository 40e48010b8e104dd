//! Append-only event store boundary.
//!
//! The social store's data store, expressed as event streams: one stream per
//! product, kit, beneficiary and delivery. Entities are never hard-deleted.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
