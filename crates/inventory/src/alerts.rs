use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use stockadoodle_core::{CategoryId, DomainError, DomainResult, Money, ProductId};

use crate::category::Category;
use crate::product::Product;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// One product flagged by an alert scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAlert {
    pub product_id: ProductId,
    pub name: String,
    pub stock_level: u32,
    pub min_stock_level: u32,
    pub expiration_date: Option<NaiveDate>,
    /// Negative once expired.
    pub days_until_expiry: Option<i64>,
}

impl StockAlert {
    fn from_product(p: &Product, today: NaiveDate) -> Self {
        Self {
            product_id: p.id,
            name: p.name.clone(),
            stock_level: p.stock_level,
            min_stock_level: p.min_stock_level,
            expiration_date: p.expiration_date,
            days_until_expiry: p.expiration_date.map(|d| (d - today).num_days()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryAlerts {
    pub low_stock: Vec<StockAlert>,
    pub out_of_stock: Vec<StockAlert>,
    pub expiring_soon: Vec<StockAlert>,
    pub expired: Vec<StockAlert>,
}

impl InventoryAlerts {
    /// Classify `products` as of `today`. "Expiring soon" covers
    /// `today..=today + days`; anything before today is expired.
    pub fn scan<'a, I>(products: I, today: NaiveDate, days: u32) -> Self
    where
        I: IntoIterator<Item = &'a Product>,
    {
        let horizon = today + Duration::days(i64::from(days));
        let mut alerts = Self::default();

        for p in products {
            if p.is_low_stock() {
                alerts.low_stock.push(StockAlert::from_product(p, today));
            }
            if p.is_out_of_stock() {
                alerts.out_of_stock.push(StockAlert::from_product(p, today));
            }
            match p.expiration_date {
                Some(d) if d < today => alerts.expired.push(StockAlert::from_product(p, today)),
                Some(d) if d <= horizon => alerts.expiring_soon.push(StockAlert::from_product(p, today)),
                _ => {}
            }
        }

        alerts.low_stock.sort_by_key(|a| a.stock_level);
        alerts.out_of_stock.sort_by(|a, b| a.name.cmp(&b.name));
        alerts.expiring_soon.sort_by_key(|a| a.expiration_date);
        alerts.expired.sort_by_key(|a| a.expiration_date);
        alerts
    }

    pub fn total(&self) -> usize {
        self.low_stock.len() + self.out_of_stock.len() + self.expiring_soon.len() + self.expired.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryValuation {
    pub total_value: Money,
    pub product_count: usize,
    pub total_units: u64,
    pub low_stock_count: usize,
    pub out_of_stock_count: usize,
}

impl InventoryValuation {
    pub fn compute<'a, I>(products: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = &'a Product>,
    {
        let overflow = || DomainError::invariant("inventory value overflow");
        let mut v = Self::default();
        for p in products {
            let value = p.stock_value().ok_or_else(overflow)?;
            v.total_value = v.total_value.checked_add(value).ok_or_else(overflow)?;
            v.product_count += 1;
            v.total_units += u64::from(p.stock_level);
            v.low_stock_count += usize::from(p.is_low_stock());
            v.out_of_stock_count += usize::from(p.is_out_of_stock());
        }
        Ok(v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub product_count: usize,
    pub total_units: u64,
}

/// Product count per category, alphabetically, with an "Uncategorized"
/// bucket last when any product has no (or an unknown) category.
pub fn category_breakdown(products: &[Product], categories: &[Category]) -> Vec<CategoryCount> {
    let mut counts: HashMap<CategoryId, (usize, u64)> = HashMap::new();
    let mut loose = (0usize, 0u64);

    for p in products {
        let slot = match p.category_id {
            Some(id) if categories.iter().any(|c| c.id == id) => counts.entry(id).or_default(),
            _ => &mut loose,
        };
        slot.0 += 1;
        slot.1 += u64::from(p.stock_level);
    }

    let mut rows: Vec<CategoryCount> = categories
        .iter()
        .map(|c| {
            let (product_count, total_units) = counts.get(&c.id).copied().unwrap_or_default();
            CategoryCount {
                category_id: Some(c.id),
                name: c.name.clone(),
                product_count,
                total_units,
            }
        })
        .collect();
    rows.sort_by_key(|r| r.name.to_lowercase());

    if loose.0 > 0 {
        rows.push(CategoryCount {
            category_id: None,
            name: UNCATEGORIZED.to_string(),
            product_count: loose.0,
            total_units: loose.1,
        });
    }
    rows
}
