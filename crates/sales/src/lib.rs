//! Point-of-sale domain: sales, retailer metrics and sales reports.
//!
//! Deterministic domain logic only. Recording a sale touches products,
//! metrics and the activity log; the store runs these steps atomically.

pub mod metrics;
pub mod report;
pub mod sale;

pub use metrics::{Achievement, LeaderboardEntry, RetailerMetrics, TargetProgress, leaderboard};
pub use report::{
    DateRange, PeriodGrouping, PeriodTotal, ProductSales, RetailerRevenue, SalesSummary,
    revenue_by_retailer, sales_by_period, top_products,
};
pub use sale::{NewSale, Sale, SaleItemInput, SaleLine};
