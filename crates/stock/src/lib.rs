//! Stock domain module (event-sourced).
//!
//! Products and the stock ledger rules: every change to a product's stock is a
//! [`StockMovement`] recorded by the product aggregate, so the stock level and
//! its audit trail can never drift apart.

pub mod movement;
pub mod product;

pub use movement::{MovementId, MovementType, StockMovement};
pub use product::{
    CreateProduct, DeactivateProduct, MeasureUnit, Product, ProductCategory, ProductCommand,
    ProductCreated, ProductDeactivated, ProductDetailsUpdated, ProductEvent, ProductId,
    ProductReactivated, ReactivateProduct, RecordMovement, StockMoved, UpdateProductDetails,
};

/// Aggregate type tag used for product streams.
pub const PRODUCT_AGGREGATE: &str = "stock.product";
