//! Activity log ("Logs" entity): append-only audit entries for product
//! movements, user actions and direct API operations.
//!
//! Pure domain code: building, filtering and summarizing entries. Persisting
//! them is the store's job.

pub mod entry;
pub mod filter;
pub mod summary;

pub use entry::{ActivityEntry, ActivitySource, ProductAction, RequestInfo};
pub use filter::{ActivityFilter, ActivityPage, ActivityQuery};
pub use summary::ActivitySummary;
