//! Custom kits: ad-hoc product selections assembled by a beneficiary.
//!
//! A `CustomKit` is transient. It lives for one request flow, is validated
//! against a point-in-time product snapshot and is then turned into a delivery
//! request. Edits are pure in-memory operations.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use socialstore_core::{DomainError, DomainResult, ValueObject};
use socialstore_stock::{MeasureUnit, ProductId};

use crate::availability::{ProductLookup, ProductSnapshot, StockRequirement, first_shortfall};
use crate::kit::{Kit, KitId};

/// Kit id / name label used when a delivery has no catalog kit behind it.
pub const CUSTOM_KIT_SENTINEL: &str = "custom";

/// Provenance of a custom kit that was seeded from a catalog kit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseKit {
    pub kit_id: KitId,
    pub kit_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomKitItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit: MeasureUnit,
}

impl ValueObject for CustomKitItem {}

impl StockRequirement for CustomKitItem {
    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn required_quantity(&self) -> Decimal {
        Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomKit {
    pub base_kit: Option<BaseKit>,
    pub items: Vec<CustomKitItem>,
    pub notes: String,
}

impl CustomKit {
    pub fn from_scratch() -> Self {
        Self::default()
    }

    /// Seed from a catalog kit. Quantities are truncated to whole units
    /// (saturating at `u32::MAX`) and lines under one unit are dropped.
    /// Nothing is reserved.
    pub fn from_kit(kit: &Kit) -> Self {
        let items = kit
            .items()
            .iter()
            .filter_map(|item| {
                let quantity = item.quantity.trunc().to_u32().unwrap_or(u32::MAX);
                (quantity > 0).then(|| CustomKitItem {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity,
                    unit: item.unit,
                })
            })
            .collect();

        Self {
            base_kit: Some(BaseKit {
                kit_id: kit.id_typed(),
                kit_name: kit.name().to_string(),
            }),
            items,
            notes: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CustomKitItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Add `quantity` of a product; a product already in the kit has its
    /// quantity increased instead of getting a second line.
    pub fn add_product(&mut self, product: &ProductSnapshot, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.items.iter_mut().find(|i| i.product_id == product.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.items.push(CustomKitItem {
                product_id: product.product_id,
                product_name: product.name.clone(),
                quantity,
                unit: product.unit,
            }),
        }
    }

    pub fn remove_product(&mut self, product_id: ProductId) {
        self.items.retain(|i| i.product_id != product_id);
    }

    /// Set a line's quantity. Zero or less removes the line; unknown products
    /// are ignored.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: i64) {
        if quantity <= 0 {
            self.remove_product(product_id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
        }
    }

    /// Check every line against the current product snapshot. Reports the
    /// first problem found.
    pub fn validate(&self, lookup: &impl ProductLookup) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("add at least one product"));
        }
        match first_shortfall(&self.items, lookup) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Human-readable summary stored as the delivery's request notes.
    pub fn describe(&self, notes: &str) -> String {
        let mut out = String::from("Custom kit");
        if let Some(base) = &self.base_kit {
            out.push_str(&format!(" based on {}", base.kit_name));
        }
        out.push_str(":\n");
        for item in &self.items {
            out.push_str(&format!(
                "- {}: {} {}\n",
                item.product_name,
                item.quantity,
                item.unit.label()
            ));
        }
        let notes = notes.trim();
        if !notes.is_empty() {
            out.push_str(&format!("Notes: {notes}\n"));
        }
        out.trim_end().to_string()
    }

    pub fn kit_id_label(&self) -> String {
        self.base_kit
            .as_ref()
            .map(|b| b.kit_id.to_string())
            .unwrap_or_else(|| CUSTOM_KIT_SENTINEL.to_string())
    }

    pub fn kit_name_label(&self) -> String {
        self.base_kit
            .as_ref()
            .map(|b| b.kit_name.clone())
            .unwrap_or_else(|| CUSTOM_KIT_SENTINEL.to_string())
    }
}
