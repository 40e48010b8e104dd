//! Registration and soft (de)activation of products, kits and beneficiaries.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use socialstore_beneficiaries::{
    BENEFICIARY_AGGREGATE, Beneficiary, BeneficiaryCommand, BeneficiaryId, BeneficiaryProfile,
    DeactivateBeneficiary, ReactivateBeneficiary, RegisterBeneficiary, UpdateProfile,
};
use socialstore_core::{ActorId, AggregateId, AggregateRoot};
use socialstore_events::{EventBus, EventEnvelope};
use socialstore_kits::{
    CreateKit, DeactivateKit, KIT_AGGREGATE, Kit, KitCommand, KitId, KitItem, ReactivateKit,
    UpdateKit,
};
use socialstore_stock::{
    CreateProduct, DeactivateProduct, MeasureUnit, PRODUCT_AGGREGATE, Product, ProductCategory,
    ProductCommand, ProductId, ReactivateProduct, UpdateProductDetails,
};

use super::{Context, make_beneficiary, make_kit, make_product};
use crate::command_dispatcher::DispatchError;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

/// Descriptive fields of a product. Stock is never set here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub category: ProductCategory,
    pub unit: MeasureUnit,
    pub minimum_stock: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitItemRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
}

/// A kit as typed by a collaborator; product names and units are filled in
/// from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitDraft {
    pub name: String,
    pub description: String,
    pub items: Vec<KitItemRequest>,
}

pub struct Catalog<'a, S, B> {
    ctx: &'a Context<S, B>,
}

impl<'a, S, B> Catalog<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: &'a Context<S, B>) -> Self {
        Self { ctx }
    }

    // -------------------------
    // Products
    // -------------------------

    pub fn create_product(&self, details: ProductDetails, created_by: &ActorId) -> ServiceResult<Product> {
        let id = AggregateId::new();
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id: ProductId::new(id),
            name: details.name,
            category: details.category,
            unit: details.unit,
            minimum_stock: details.minimum_stock,
            created_by: created_by.clone(),
            occurred_at: Utc::now(),
        });

        let product = self
            .ctx
            .with_retries("failed to create product", || {
                self.ctx.dispatcher.dispatch(id, PRODUCT_AGGREGATE, &cmd, make_product)
            })?;
        info!(product_id = %id, name = product.name(), "product created");
        Ok(product)
    }

    pub fn update_product(
        &self,
        product_id: ProductId,
        details: ProductDetails,
        updated_by: &ActorId,
    ) -> ServiceResult<Product> {
        let cmd = ProductCommand::UpdateProductDetails(UpdateProductDetails {
            product_id,
            name: details.name,
            category: details.category,
            unit: details.unit,
            minimum_stock: details.minimum_stock,
            updated_by: updated_by.clone(),
            occurred_at: Utc::now(),
        });
        self.product_command("failed to update product", product_id, cmd)
    }

    pub fn deactivate_product(&self, product_id: ProductId, performed_by: &ActorId) -> ServiceResult<Product> {
        let cmd = ProductCommand::DeactivateProduct(DeactivateProduct {
            product_id,
            performed_by: performed_by.clone(),
            occurred_at: Utc::now(),
        });
        self.product_command("failed to deactivate product", product_id, cmd)
    }

    pub fn reactivate_product(&self, product_id: ProductId, performed_by: &ActorId) -> ServiceResult<Product> {
        let cmd = ProductCommand::ReactivateProduct(ReactivateProduct {
            product_id,
            performed_by: performed_by.clone(),
            occurred_at: Utc::now(),
        });
        self.product_command("failed to reactivate product", product_id, cmd)
    }

    pub fn get_product(&self, product_id: ProductId) -> ServiceResult<Product> {
        self.ctx.product(product_id).context("failed to load product")
    }

    fn product_command(
        &self,
        operation: &'static str,
        product_id: ProductId,
        cmd: ProductCommand,
    ) -> ServiceResult<Product> {
        // Stock movements bump the same stream, so these can race with the ledger.
        let product = self.ctx.with_retries(operation, || {
            self.ctx
                .dispatcher
                .dispatch(product_id.0, PRODUCT_AGGREGATE, &cmd, make_product)
        })?;
        info!(product_id = %product_id, version = product.version(), "product updated");
        Ok(product)
    }

    // -------------------------
    // Kits
    // -------------------------

    pub fn create_kit(&self, draft: KitDraft, created_by: &ActorId) -> ServiceResult<Kit> {
        let id = AggregateId::new();
        let kit = self.ctx.with_retries("failed to create kit", || {
            let cmd = KitCommand::CreateKit(CreateKit {
                kit_id: KitId::new(id),
                name: draft.name.clone(),
                description: draft.description.clone(),
                items: self.resolve_items(&draft.items)?,
                created_by: created_by.clone(),
                occurred_at: Utc::now(),
            });
            self.ctx.dispatcher.dispatch(id, KIT_AGGREGATE, &cmd, make_kit)
        })?;
        info!(kit_id = %id, name = kit.name(), items = kit.items().len(), "kit created");
        Ok(kit)
    }

    /// Replace a kit's name, description and items.
    pub fn update_kit(&self, kit_id: KitId, draft: KitDraft, updated_by: &ActorId) -> ServiceResult<Kit> {
        let kit = self.ctx.with_retries("failed to update kit", || {
            let cmd = KitCommand::UpdateKit(UpdateKit {
                kit_id,
                name: draft.name.clone(),
                description: draft.description.clone(),
                items: self.resolve_items(&draft.items)?,
                updated_by: updated_by.clone(),
                occurred_at: Utc::now(),
            });
            self.ctx.dispatcher.dispatch(kit_id.0, KIT_AGGREGATE, &cmd, make_kit)
        })?;
        info!(kit_id = %kit_id, items = kit.items().len(), "kit updated");
        Ok(kit)
    }

    pub fn deactivate_kit(&self, kit_id: KitId, performed_by: &ActorId) -> ServiceResult<Kit> {
        let cmd = KitCommand::DeactivateKit(DeactivateKit {
            kit_id,
            performed_by: performed_by.clone(),
            occurred_at: Utc::now(),
        });
        let kit = self.ctx.with_retries("failed to deactivate kit", || {
            self.ctx.dispatcher.dispatch(kit_id.0, KIT_AGGREGATE, &cmd, make_kit)
        })?;
        info!(kit_id = %kit_id, "kit deactivated");
        Ok(kit)
    }

    pub fn reactivate_kit(&self, kit_id: KitId, performed_by: &ActorId) -> ServiceResult<Kit> {
        let cmd = KitCommand::ReactivateKit(ReactivateKit {
            kit_id,
            performed_by: performed_by.clone(),
            occurred_at: Utc::now(),
        });
        let kit = self.ctx.with_retries("failed to reactivate kit", || {
            self.ctx.dispatcher.dispatch(kit_id.0, KIT_AGGREGATE, &cmd, make_kit)
        })?;
        info!(kit_id = %kit_id, "kit reactivated");
        Ok(kit)
    }

    pub fn get_kit(&self, kit_id: KitId) -> ServiceResult<Kit> {
        self.ctx.kit(kit_id).context("failed to load kit")
    }

    /// Every item must reference an existing product; names and units are
    /// snapshotted from it.
    fn resolve_items(&self, requests: &[KitItemRequest]) -> Result<Vec<KitItem>, DispatchError> {
        requests
            .iter()
            .map(|req| {
                let product = self.ctx.product(req.product_id)?;
                Ok(KitItem {
                    product_id: req.product_id,
                    product_name: product.name().to_string(),
                    quantity: req.quantity,
                    unit: product.unit(),
                })
            })
            .collect()
    }

    // -------------------------
    // Beneficiaries
    // -------------------------

    pub fn register_beneficiary(
        &self,
        user_id: ActorId,
        name: &str,
        profile: BeneficiaryProfile,
        registered_by: &ActorId,
    ) -> ServiceResult<Beneficiary> {
        let id = AggregateId::new();
        let cmd = BeneficiaryCommand::RegisterBeneficiary(RegisterBeneficiary {
            beneficiary_id: BeneficiaryId::new(id),
            user_id,
            name: name.to_string(),
            profile,
            registered_by: registered_by.clone(),
            occurred_at: Utc::now(),
        });
        let beneficiary = self.beneficiary_command("failed to register beneficiary", id, cmd)?;
        info!(beneficiary_id = %id, "beneficiary registered");
        Ok(beneficiary)
    }

    /// Replace the profile; `name` is kept when `None`.
    pub fn update_beneficiary_profile(
        &self,
        beneficiary_id: BeneficiaryId,
        name: Option<String>,
        profile: BeneficiaryProfile,
        updated_by: &ActorId,
    ) -> ServiceResult<Beneficiary> {
        let cmd = BeneficiaryCommand::UpdateProfile(UpdateProfile {
            beneficiary_id,
            name,
            profile,
            updated_by: updated_by.clone(),
            occurred_at: Utc::now(),
        });
        let beneficiary = self.beneficiary_command("failed to update beneficiary", beneficiary_id.0, cmd)?;
        info!(beneficiary_id = %beneficiary_id, "beneficiary profile updated");
        Ok(beneficiary)
    }

    pub fn deactivate_beneficiary(
        &self,
        beneficiary_id: BeneficiaryId,
        reason: Option<String>,
        performed_by: &ActorId,
    ) -> ServiceResult<Beneficiary> {
        let cmd = BeneficiaryCommand::DeactivateBeneficiary(DeactivateBeneficiary {
            beneficiary_id,
            performed_by: performed_by.clone(),
            reason,
            occurred_at: Utc::now(),
        });
        let beneficiary =
            self.beneficiary_command("failed to deactivate beneficiary", beneficiary_id.0, cmd)?;
        info!(beneficiary_id = %beneficiary_id, "beneficiary deactivated");
        Ok(beneficiary)
    }

    pub fn reactivate_beneficiary(
        &self,
        beneficiary_id: BeneficiaryId,
        performed_by: &ActorId,
    ) -> ServiceResult<Beneficiary> {
        let cmd = BeneficiaryCommand::ReactivateBeneficiary(ReactivateBeneficiary {
            beneficiary_id,
            performed_by: performed_by.clone(),
            occurred_at: Utc::now(),
        });
        let beneficiary =
            self.beneficiary_command("failed to reactivate beneficiary", beneficiary_id.0, cmd)?;
        info!(beneficiary_id = %beneficiary_id, "beneficiary reactivated");
        Ok(beneficiary)
    }

    pub fn get_beneficiary(&self, beneficiary_id: BeneficiaryId) -> ServiceResult<Beneficiary> {
        self.ctx
            .beneficiary(beneficiary_id)
            .context("failed to load beneficiary")
    }

    fn beneficiary_command(
        &self,
        operation: &'static str,
        id: AggregateId,
        cmd: BeneficiaryCommand,
    ) -> ServiceResult<Beneficiary> {
        self.ctx.with_retries(operation, || {
            self.ctx
                .dispatcher
                .dispatch(id, BENEFICIARY_AGGREGATE, &cmd, make_beneficiary)
        })
    }
}
