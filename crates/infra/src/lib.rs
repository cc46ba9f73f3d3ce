//! Infrastructure layer: configuration, storage and first-run seeding.

pub mod config;
pub mod seed;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use seed::{SeedReport, seed_defaults};
pub use store::{Actor, DynStore, InMemoryStore, SqliteStore, StockRequest, Store, StoreError};
