//! Kits domain module.
//!
//! - [`kit`]: the event-sourced Kit template aggregate.
//! - [`availability`]: point-in-time "can this be delivered now" checks.
//! - [`custom_kit`]: the transient, beneficiary-built selection and its validator.
//!
//! Availability and custom kit validation never touch storage; they read stock
//! through the [`ProductLookup`] seam so infra can feed them a snapshot.

pub mod availability;
pub mod custom_kit;
pub mod kit;

pub use availability::{
    LineAvailability, ProductLookup, ProductSnapshot, StockRequirement, availability_details,
    check_availability, first_shortfall,
};
pub use custom_kit::{BaseKit, CUSTOM_KIT_SENTINEL, CustomKit, CustomKitItem};
pub use kit::{
    CreateKit, DeactivateKit, Kit, KitCommand, KitCreated, KitDeactivated, KitEvent, KitId,
    KitItem, KitReactivated, KitUpdated, ReactivateKit, UpdateKit,
};

/// Aggregate type tag used for kit streams.
pub const KIT_AGGREGATE: &str = "kits.kit";
