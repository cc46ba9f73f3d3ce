//! Persistence for every entity behind one async [`Store`] trait.
//!
//! Two implementations share the contract: [`InMemoryStore`] for tests and
//! development and [`SqliteStore`] for persistent deployments. Multi-row
//! operations (sales, undo, stock movements with their activity entries) are
//! atomic in both.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockadoodle_activity::{ActivityEntry, ActivityPage, ActivityQuery, ActivitySource, ActivitySummary};
use stockadoodle_auth::{Role, User};
use stockadoodle_core::{CategoryId, DomainError, ProductId, SaleId, UserId};
use stockadoodle_inventory::{Category, Product, StockChange, StockMovement};
use stockadoodle_sales::{DateRange, NewSale, RetailerMetrics, Sale};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(entity: &'static str) -> Self {
        StoreError::Domain(DomainError::not_found(entity))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Domain(DomainError::conflict(msg))
    }
}

/// Who triggered a write, for the activity log.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub source: ActivitySource,
}

impl Actor {
    pub fn api(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            source: ActivitySource::Api,
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            source: ActivitySource::Api,
        }
    }
}

/// A stock movement request together with its log context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub movement: StockMovement,
    pub actor: Actor,
    pub notes: Option<String>,
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // users

    /// Insert a user; usernames are unique. Retailers get a metrics row.
    async fn create_user(&self, user: User) -> Result<User, StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError>;
    /// Replace a stored user.
    async fn update_user(&self, user: User) -> Result<User, StoreError>;
    /// Delete a user and its metrics. Sales and activity entries stay.
    async fn delete_user(&self, id: UserId) -> Result<(), StoreError>;

    // categories

    async fn create_category(&self, category: Category) -> Result<Category, StoreError>;
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn update_category(&self, category: Category) -> Result<Category, StoreError>;
    /// Delete a category and un-assign its products.
    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError>;

    // products

    /// Insert a product (unique name, known category) and log `Created`.
    async fn create_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError>;
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    /// Replace a product and log `Updated`.
    async fn update_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError>;
    /// Delete a product and log `Deleted`.
    async fn delete_product(&self, id: ProductId, actor: Actor, now: DateTime<Utc>) -> Result<(), StoreError>;
    /// Apply one movement and append its activity entry atomically.
    async fn apply_stock(&self, request: StockRequest, now: DateTime<Utc>) -> Result<StockChange, StoreError>;

    // sales

    /// Price, validate and record a sale; decrement stock, update the
    /// retailer's metrics and log each line, all or nothing.
    async fn record_sale(&self, sale: NewSale, retailer_id: UserId, now: DateTime<Utc>) -> Result<Sale, StoreError>;
    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;
    /// Sales inside `range`, oldest first.
    async fn list_sales(&self, range: DateRange) -> Result<Vec<Sale>, StoreError>;
    /// Restore stock, revert metrics, log and delete the sale, all or nothing.
    async fn undo_sale(&self, id: SaleId, actor: Actor, now: DateTime<Utc>) -> Result<Sale, StoreError>;

    // metrics

    async fn get_metrics(&self, retailer_id: UserId) -> Result<Option<RetailerMetrics>, StoreError>;
    async fn list_metrics(&self) -> Result<Vec<RetailerMetrics>, StoreError>;

    // activity

    async fn append_activity(&self, entry: ActivityEntry) -> Result<(), StoreError>;
    async fn query_activity(&self, query: ActivityQuery) -> Result<ActivityPage, StoreError>;
    async fn activity_summary(&self, now: DateTime<Utc>) -> Result<ActivitySummary, StoreError>;
}

pub type DynStore = Arc<dyn Store>;
