use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use socialstore_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ensure_non_negative,
    ensure_not_blank,
};
use socialstore_events::Event;

use crate::movement::{MovementId, MovementType, StockMovement};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Food,
    Hygiene,
    Cleaning,
    Other,
}

/// Unit a product is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasureUnit {
    Unit,
    Kilogram,
    Liter,
    Package,
}

impl MeasureUnit {
    /// Short label used in human-readable descriptions.
    pub fn label(self) -> &'static str {
        match self {
            MeasureUnit::Unit => "un",
            MeasureUnit::Kilogram => "kg",
            MeasureUnit::Liter => "L",
            MeasureUnit::Package => "pack",
        }
    }
}

/// Aggregate root: Product.
///
/// `current_stock` only changes through [`StockMoved`] events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    category: ProductCategory,
    unit: MeasureUnit,
    current_stock: Decimal,
    minimum_stock: Decimal,
    active: bool,
    created_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            category: ProductCategory::Other,
            unit: MeasureUnit::Unit,
            current_stock: Decimal::ZERO,
            minimum_stock: Decimal::ZERO,
            active: false,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ProductCategory {
        self.category
    }

    pub fn unit(&self) -> MeasureUnit {
        self.unit
    }

    pub fn current_stock(&self) -> Decimal {
        self.current_stock
    }

    pub fn minimum_stock(&self) -> Decimal {
        self.minimum_stock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_by(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// At or below the minimum stock level.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.minimum_stock
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct. New products start with zero stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit: MeasureUnit,
    pub minimum_stock: Decimal,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit: MeasureUnit,
    pub minimum_stock: Decimal,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateProduct (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateProduct {
    pub product_id: ProductId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateProduct {
    pub product_id: ProductId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement. The only way stock changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub performed_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    DeactivateProduct(DeactivateProduct),
    ReactivateProduct(ReactivateProduct),
    RecordMovement(RecordMovement),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit: MeasureUnit,
    pub minimum_stock: Decimal,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub category: ProductCategory,
    pub unit: MeasureUnit,
    pub minimum_stock: Decimal,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeactivated {
    pub product_id: ProductId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReactivated {
    pub product_id: ProductId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. Carries the full movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub movement: StockMovement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    ProductDeactivated(ProductDeactivated),
    ProductReactivated(ProductReactivated),
    StockMoved(StockMoved),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "stock.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "stock.product.updated",
            ProductEvent::ProductDeactivated(_) => "stock.product.deactivated",
            ProductEvent::ProductReactivated(_) => "stock.product.reactivated",
            ProductEvent::StockMoved(_) => "stock.movement.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeactivated(e) => e.occurred_at,
            ProductEvent::ProductReactivated(e) => e.occurred_at,
            ProductEvent::StockMoved(e) => e.movement.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.category = e.category;
                self.unit = e.unit;
                self.minimum_stock = e.minimum_stock;
                self.current_stock = Decimal::ZERO;
                self.active = true;
                self.created_by = Some(e.created_by.clone());
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category;
                self.unit = e.unit;
                self.minimum_stock = e.minimum_stock;
                self.updated_at = Some(e.occurred_at);
            }
            ProductEvent::ProductDeactivated(e) => {
                self.active = false;
                self.updated_at = Some(e.occurred_at);
            }
            ProductEvent::ProductReactivated(e) => {
                self.active = true;
                self.updated_at = Some(e.occurred_at);
            }
            ProductEvent::StockMoved(e) => {
                self.current_stock = e.movement.stock_after;
                self.updated_at = Some(e.movement.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update(cmd),
            ProductCommand::DeactivateProduct(cmd) => self.handle_deactivate(cmd),
            ProductCommand::ReactivateProduct(cmd) => self.handle_reactivate(cmd),
            ProductCommand::RecordMovement(cmd) => self.handle_movement(cmd),
        }
    }
}

impl Product {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {}", self.id)));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        ensure_not_blank(&cmd.name, "product name")?;
        ensure_non_negative(cmd.minimum_stock, "minimum stock")?;
        cmd.created_by.ensure_present("created by")?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            category: cmd.category,
            unit: cmd.unit,
            minimum_stock: cmd.minimum_stock,
            created_by: cmd.created_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProductDetails) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        ensure_not_blank(&cmd.name, "product name")?;
        ensure_non_negative(cmd.minimum_stock, "minimum stock")?;
        cmd.updated_by.ensure_present("updated by")?;

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            category: cmd.category,
            unit: cmd.unit,
            minimum_stock: cmd.minimum_stock,
            updated_by: cmd.updated_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.performed_by.ensure_present("performed by")?;

        if !self.active {
            return Err(DomainError::validation(format!(
                "product {} is already inactive",
                self.name
            )));
        }

        Ok(vec![ProductEvent::ProductDeactivated(ProductDeactivated {
            product_id: cmd.product_id,
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.performed_by.ensure_present("performed by")?;

        if self.active {
            return Err(DomainError::validation(format!(
                "product {} is already active",
                self.name
            )));
        }

        Ok(vec![ProductEvent::ProductReactivated(ProductReactivated {
            product_id: cmd.product_id,
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        cmd.performed_by.ensure_present("performed by")?;
        ensure_not_blank(&cmd.reason, "movement reason")?;

        let delta = cmd
            .movement_type
            .delta(&self.name, cmd.quantity, self.current_stock)?;
        let stock_after = self.current_stock.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!("stock of {} would overflow", self.name))
        })?;
        debug_assert!(stock_after >= Decimal::ZERO);

        Ok(vec![ProductEvent::StockMoved(StockMoved {
            movement: StockMovement {
                movement_id: cmd.movement_id,
                product_id: cmd.product_id,
                movement_type: cmd.movement_type,
                quantity: cmd.quantity,
                delta,
                stock_before: self.current_stock,
                stock_after,
                performed_by: cmd.performed_by.clone(),
                reason: cmd.reason.trim().to_string(),
                occurred_at: cmd.occurred_at,
            },
        })])
    }
}
