//! `stockadoodle-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model, money and pagination.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod nullable;
pub mod page;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, Violations};
pub use id::{CategoryId, LogId, ProductId, SaleId, UserId};
pub use money::Money;
pub use page::{Page, PageRequest};
