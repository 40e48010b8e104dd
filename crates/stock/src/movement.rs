//! Stock movement records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use socialstore_core::{ActorId, DomainError, DomainResult, ValueObject, ensure_non_negative, ensure_positive};

use crate::product::ProductId;

/// Identifier of a single stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

impl MovementId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of stock movement.
///
/// For `Adjustment` the movement quantity is the new absolute stock level;
/// for every other kind it is the amount moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
    Transfer,
}

impl MovementType {
    /// Signed change this movement makes to `current` stock.
    ///
    /// Exits and transfers fail with `InsufficientStock` when they exceed the
    /// stock on hand; nothing is ever clamped.
    pub fn delta(
        self,
        product: &str,
        quantity: Decimal,
        current: Decimal,
    ) -> DomainResult<Decimal> {
        match self {
            MovementType::Entry => {
                ensure_positive(quantity, "entry quantity")?;
                Ok(quantity)
            }
            MovementType::Exit | MovementType::Transfer => {
                ensure_positive(quantity, "exit quantity")?;
                if quantity > current {
                    return Err(DomainError::insufficient_stock(product, current, quantity));
                }
                Ok(-quantity)
            }
            MovementType::Adjustment => {
                ensure_non_negative(quantity, "adjusted stock level")?;
                let delta = quantity - current;
                if delta.is_zero() {
                    return Err(DomainError::validation(format!(
                        "adjustment does not change stock of {product} (already {current})"
                    )));
                }
                Ok(delta)
            }
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MovementType::Entry => "ENTRY",
            MovementType::Exit => "EXIT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Transfer => "TRANSFER",
        };
        f.write_str(s)
    }
}

/// Immutable audit record of one change to a product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Quantity as requested (new level for adjustments).
    pub quantity: Decimal,
    pub delta: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub performed_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl ValueObject for StockMovement {}
