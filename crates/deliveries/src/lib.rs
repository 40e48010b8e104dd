//! Deliveries domain module (event-sourced).
//!
//! The delivery lifecycle state machine:
//!
//! ```text
//! PENDING_APPROVAL -> APPROVED -> SCHEDULED -> CONFIRMED
//! PENDING_APPROVAL -> REJECTED
//! (direct)         -> SCHEDULED
//! any non-terminal -> CANCELLED
//! ```
//!
//! The aggregate only enforces the transition table and its field rules.
//! Beneficiary/kit activity, stock availability and the stock deduction on
//! confirmation are cross-aggregate and are orchestrated by infra.

pub mod delivery;

pub use delivery::{
    Approval, ApproveDelivery, CancelDelivery, Cancellation, Confirmation, ConfirmDelivery,
    CreateDelivery, Delivery, DeliveryApproved, DeliveryCancelled, DeliveryCommand,
    DeliveryConfirmed, DeliveryCreated, DeliveryEvent, DeliveryId, DeliveryLine,
    DeliveryRejected, DeliveryRequested, DeliveryScheduled, DeliveryStatus, KitSource,
    RejectDelivery, Rejection, RequestDelivery, RequestInfo, ScheduleDelivery,
};

/// Aggregate type tag used for delivery streams.
pub const DELIVERY_AGGREGATE: &str = "deliveries.delivery";
