//! `socialstore-events`: event, envelope and pub/sub mechanics.
//!
//! Domain-agnostic: the stock, kit, beneficiary and delivery crates define
//! their own event enums and implement [`Event`] for them.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Liveness, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
