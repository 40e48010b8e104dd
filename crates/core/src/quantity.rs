//! Quantity guards for stock and kit lines.

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

pub fn ensure_positive(value: Decimal, field: &str) -> DomainResult<()> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be positive (got {value})"
        )));
    }
    Ok(())
}

pub fn ensure_non_negative(value: Decimal, field: &str) -> DomainResult<()> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} cannot be negative (got {value})"
        )));
    }
    Ok(())
}
