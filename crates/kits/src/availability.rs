//! Kit availability: point-in-time stock checks with no reservation.
//!
//! Nothing here locks or decrements stock. A positive answer can be stale a
//! moment later; the all-or-nothing stock deduction at delivery confirmation
//! is what ultimately guards consistency.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use socialstore_core::DomainError;
use socialstore_stock::{MeasureUnit, Product, ProductId};

use crate::kit::KitItem;

/// What availability checks need to know about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub unit: MeasureUnit,
    pub current_stock: Decimal,
    pub active: bool,
}

impl From<&Product> for ProductSnapshot {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.id_typed(),
            name: p.name().to_string(),
            unit: p.unit(),
            current_stock: p.current_stock(),
            active: p.is_active(),
        }
    }
}

/// Read-only product lookup. `None` means the product does not exist.
pub trait ProductLookup {
    fn product(&self, product_id: ProductId) -> Option<ProductSnapshot>;
}

impl ProductLookup for HashMap<ProductId, ProductSnapshot> {
    fn product(&self, product_id: ProductId) -> Option<ProductSnapshot> {
        self.get(&product_id).cloned()
    }
}

impl<L: ProductLookup + ?Sized> ProductLookup for &L {
    fn product(&self, product_id: ProductId) -> Option<ProductSnapshot> {
        (**self).product(product_id)
    }
}

/// A line that needs `required_quantity()` of one product.
pub trait StockRequirement {
    fn product_id(&self) -> ProductId;
    fn product_name(&self) -> &str;
    fn required_quantity(&self) -> Decimal;
}

impl StockRequirement for KitItem {
    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn required_quantity(&self) -> Decimal {
        self.quantity
    }
}

/// Per-line availability detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAvailability {
    pub product_name: String,
    pub available_stock: Decimal,
    pub required_quantity: Decimal,
    pub is_available: bool,
}

fn line_availability<R: StockRequirement>(line: &R, lookup: &impl ProductLookup) -> LineAvailability {
    let required = line.required_quantity();
    match lookup.product(line.product_id()) {
        Some(p) => LineAvailability {
            product_name: p.name,
            available_stock: p.current_stock,
            required_quantity: required,
            is_available: p.active && p.current_stock >= required,
        },
        None => LineAvailability {
            product_name: line.product_name().to_string(),
            available_stock: Decimal::ZERO,
            required_quantity: required,
            is_available: false,
        },
    }
}

/// True iff every line's product exists, is active and has enough stock.
/// An empty list is vacuously available.
pub fn check_availability<R: StockRequirement>(lines: &[R], lookup: &impl ProductLookup) -> bool {
    lines.iter().all(|l| line_availability(l, lookup).is_available)
}

/// Per-product breakdown, so collaborators can see exactly what is short.
pub fn availability_details<R: StockRequirement>(
    lines: &[R],
    lookup: &impl ProductLookup,
) -> BTreeMap<ProductId, LineAvailability> {
    lines
        .iter()
        .map(|l| (l.product_id(), line_availability(l, lookup)))
        .collect()
}

/// The error describing the first unavailable line, if any.
pub fn first_shortfall<R: StockRequirement>(
    lines: &[R],
    lookup: &impl ProductLookup,
) -> Option<DomainError> {
    lines.iter().find_map(|line| match lookup.product(line.product_id()) {
        None => Some(DomainError::not_found(format!(
            "product {} ({})",
            line.product_name(),
            line.product_id()
        ))),
        Some(p) if !p.active => Some(DomainError::validation(format!(
            "product {} is no longer active",
            p.name
        ))),
        Some(p) if p.current_stock < line.required_quantity() => Some(
            DomainError::insufficient_stock(p.name, p.current_stock, line.required_quantity()),
        ),
        Some(_) => None,
    })
}
