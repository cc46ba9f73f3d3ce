//! Inventory domain: categories, products, stock movements, alerts and
//! valuation.
//!
//! Pure, deterministic domain logic (no IO, no HTTP, no storage). Stores
//! load entities, call into this crate and persist the result.

pub mod alerts;
pub mod category;
pub mod product;
pub mod query;
pub mod stock;

pub use alerts::{CategoryCount, InventoryAlerts, InventoryValuation, StockAlert, category_breakdown};
pub use category::{Category, CategoryInput};
pub use product::{NewProduct, Product, ProductPatch, ProductView};
pub use query::ProductQuery;
pub use stock::{MAX_STOCK, StockChange, StockMovement};
