//! Read-side sales reports. All functions take already-loaded sales.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use stockadoodle_core::{DomainError, DomainResult, Money, ProductId, UserId};

use crate::sale::Sale;

pub const DEFAULT_TOP_PRODUCTS: usize = 10;
pub const MAX_TOP_PRODUCTS: usize = 100;

/// Inclusive time window; open ends are unbounded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DomainError::validation("start must not be after end"));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }

    pub fn filter<'a>(&self, sales: &'a [Sale]) -> Vec<&'a Sale> {
        sales.iter().filter(|s| self.contains(s.created_at)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub total_revenue: Money,
    pub transactions: u64,
    pub units_sold: u64,
    pub average_sale: Money,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl SalesSummary {
    pub fn from_sales(sales: &[Sale], range: DateRange) -> Self {
        let mut total_revenue = Money::ZERO;
        let mut transactions = 0u64;
        let mut units_sold = 0u64;
        for sale in range.filter(sales) {
            total_revenue = total_revenue.saturating_add(sale.total_amount);
            transactions += 1;
            units_sold += sale.units();
        }
        Self {
            total_revenue,
            transactions,
            units_sold,
            average_sale: total_revenue.average(transactions),
            start_date: range.start,
            end_date: range.end,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGrouping {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl PeriodGrouping {
    /// `2024-05-01`, `2024-W18` (ISO week) or `2024-05`.
    pub fn label(&self, day: NaiveDate) -> String {
        match self {
            PeriodGrouping::Daily => day.format("%Y-%m-%d").to_string(),
            PeriodGrouping::Weekly => {
                let week = day.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            PeriodGrouping::Monthly => day.format("%Y-%m").to_string(),
        }
    }
}

impl core::str::FromStr for PeriodGrouping {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(PeriodGrouping::Daily),
            "weekly" | "week" => Ok(PeriodGrouping::Weekly),
            "monthly" | "month" => Ok(PeriodGrouping::Monthly),
            other => Err(DomainError::validation(format!(
                "invalid grouping '{other}' (expected daily, weekly or monthly)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodTotal {
    pub period: String,
    pub revenue: Money,
    pub transactions: u64,
    pub units_sold: u64,
}

/// Revenue per period, oldest first.
pub fn sales_by_period(sales: &[Sale], range: DateRange, grouping: PeriodGrouping) -> Vec<PeriodTotal> {
    let mut buckets: BTreeMap<String, PeriodTotal> = BTreeMap::new();
    for sale in range.filter(sales) {
        let period = grouping.label(sale.created_at.date_naive());
        let bucket = buckets.entry(period.clone()).or_insert_with(|| PeriodTotal {
            period,
            revenue: Money::ZERO,
            transactions: 0,
            units_sold: 0,
        });
        bucket.revenue = bucket.revenue.saturating_add(sale.total_amount);
        bucket.transactions += 1;
        bucket.units_sold += sale.units();
    }
    buckets.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub product_name: String,
    pub units_sold: u64,
    pub revenue: Money,
}

/// Best sellers by units, then revenue.
pub fn top_products(sales: &[Sale], range: DateRange, limit: Option<usize>) -> Vec<ProductSales> {
    let limit = limit.unwrap_or(DEFAULT_TOP_PRODUCTS).clamp(1, MAX_TOP_PRODUCTS);
    let mut by_product: HashMap<ProductId, ProductSales> = HashMap::new();
    for sale in range.filter(sales) {
        for line in &sale.lines {
            let row = by_product.entry(line.product_id).or_insert_with(|| ProductSales {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                units_sold: 0,
                revenue: Money::ZERO,
            });
            row.units_sold += u64::from(line.quantity);
            row.revenue = row.revenue.saturating_add(line.line_total);
        }
    }

    let mut rows: Vec<ProductSales> = by_product.into_values().collect();
    rows.sort_by(|a, b| {
        b.units_sold
            .cmp(&a.units_sold)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetailerRevenue {
    pub retailer_id: UserId,
    pub revenue: Money,
    pub transactions: u64,
    pub units_sold: u64,
}

/// Revenue per retailer, highest first.
pub fn revenue_by_retailer(sales: &[Sale], range: DateRange) -> Vec<RetailerRevenue> {
    let mut by_retailer: HashMap<UserId, RetailerRevenue> = HashMap::new();
    for sale in range.filter(sales) {
        let row = by_retailer.entry(sale.retailer_id).or_insert_with(|| RetailerRevenue {
            retailer_id: sale.retailer_id,
            revenue: Money::ZERO,
            transactions: 0,
            units_sold: 0,
        });
        row.revenue = row.revenue.saturating_add(sale.total_amount);
        row.transactions += 1;
        row.units_sold += sale.units();
    }

    let mut rows: Vec<RetailerRevenue> = by_retailer.into_values().collect();
    rows.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| b.transactions.cmp(&a.transactions))
            .then_with(|| a.retailer_id.cmp(&b.retailer_id))
    });
    rows
}
