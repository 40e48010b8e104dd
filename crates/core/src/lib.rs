//! `socialstore-core`: domain building blocks shared by every social store module.
//!
//! Pure domain primitives only: aggregates, identifiers, quantities and the
//! domain error model. Nothing here performs IO.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod quantity;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AggregateId};
pub use quantity::{ensure_non_negative, ensure_positive};
pub use value_object::ValueObject;

/// Re-export so domain crates agree on one decimal type for stock quantities.
pub use rust_decimal::Decimal;

/// Reject blank free-text fields (reasons, names, actor ids) with a message naming the field.
pub fn ensure_not_blank(value: &str, field: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}
