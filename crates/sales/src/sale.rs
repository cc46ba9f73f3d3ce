use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockadoodle_activity::{ActivityEntry, ActivitySource};
use stockadoodle_core::{DomainError, DomainResult, Entity, Money, ProductId, SaleId, UserId};
use stockadoodle_inventory::{Product, StockChange, StockMovement};

/// One requested line of a sale, as received over JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaleItemInput {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Unit price override; defaults to the product's current price.
    #[serde(default)]
    pub price: Option<f64>,
}

/// Sale request. `total_amount`, when given, must match the computed total.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewSale {
    pub items: Vec<SaleItemInput>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    /// Name at the time of sale; kept for reports after product deletion.
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl SaleLine {
    pub fn note(&self) -> String {
        format!("Qty {}", self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub retailer_id: UserId,
    pub lines: Vec<SaleLine>,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl NewSale {
    /// Checks that need no product data: non-empty, positive quantities,
    /// each product at most once, sane price overrides.
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("a sale needs at least one item"));
        }
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be greater than zero",
                    item.product_id
                )));
            }
            if u32::try_from(item.quantity).is_err() {
                return Err(DomainError::validation(format!(
                    "quantity for product {} is too large",
                    item.product_id
                )));
            }
            if !seen.insert(item.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    item.product_id
                )));
            }
            if let Some(price) = item.price {
                Money::from_decimal(price)?;
            }
        }
        if let Some(total) = self.total_amount {
            Money::from_decimal(total)?;
        }
        Ok(())
    }

    /// Price every line against current product data and build the sale.
    ///
    /// Fails without side effects on an unknown product, insufficient stock
    /// or a client total that disagrees with the computed one.
    pub fn prepare<'a, F>(&self, retailer_id: UserId, mut find: F, now: DateTime<Utc>) -> DomainResult<Sale>
    where
        F: FnMut(ProductId) -> Option<&'a Product>,
    {
        self.validate()?;

        let mut lines = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let product = find(item.product_id).ok_or(DomainError::not_found("product"))?;
            let quantity = u32::try_from(item.quantity)
                .map_err(|_| DomainError::validation("quantity is too large"))?;

            if product.stock_level < quantity {
                return Err(DomainError::invariant(format!(
                    "insufficient stock for '{}': {} available, {} requested",
                    product.name, product.stock_level, quantity
                )));
            }

            let unit_price = match item.price {
                Some(p) => Money::from_decimal(p)?,
                None => product.price,
            };
            let line_total = unit_price
                .checked_mul(u64::from(quantity))
                .ok_or_else(|| DomainError::validation("line total overflow"))?;

            lines.push(SaleLine {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                unit_price,
                line_total,
            });
        }

        let total_amount = Money::checked_sum(lines.iter().map(|l| l.line_total))
            .ok_or_else(|| DomainError::validation("sale total overflow"))?;

        if let Some(claimed) = self.total_amount {
            let claimed = Money::from_decimal(claimed)?;
            if claimed != total_amount {
                return Err(DomainError::validation(format!(
                    "total_amount {claimed} does not match computed total {total_amount}"
                )));
            }
        }

        Ok(Sale {
            id: SaleId::new(),
            retailer_id,
            lines,
            total_amount,
            created_at: now,
        })
    }
}

impl Sale {
    pub fn units(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Stock movements that record this sale.
    pub fn movements(&self) -> impl Iterator<Item = (ProductId, StockMovement)> + '_ {
        self.lines
            .iter()
            .map(|l| (l.product_id, StockMovement::Sale(l.quantity)))
    }

    /// Stock movements that undo this sale.
    pub fn reversal(&self) -> impl Iterator<Item = (ProductId, StockMovement)> + '_ {
        self.lines
            .iter()
            .map(|l| (l.product_id, StockMovement::Return(l.quantity)))
    }

    /// Activity entry for one applied line of this sale (or its reversal).
    pub fn line_entry(&self, change: &StockChange, user_id: Option<UserId>, at: DateTime<Utc>) -> ActivityEntry {
        let note = self
            .lines
            .iter()
            .find(|l| l.product_id == change.product_id)
            .map(|l| format!("{} (sale {})", l.note(), self.id));
        change.to_entry(user_id, note, ActivitySource::Api, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use stockadoodle_inventory::NewProduct;

    fn product(name: &str, price: f64, stock: i64) -> Product {
        NewProduct {
            name: name.into(),
            price: Some(price),
            stock_level: Some(stock),
            ..NewProduct::default()
        }
        .into_product(Utc::now())
        .unwrap()
    }

    fn catalog(products: &[Product]) -> HashMap<ProductId, Product> {
        products.iter().map(|p| (p.id, p.clone())).collect()
    }

    fn item(p: &Product, quantity: i64, price: Option<f64>) -> SaleItemInput {
        SaleItemInput {
            product_id: p.id,
            quantity,
            price,
        }
    }

    #[test]
    fn prices_lines_and_totals() {
        let a = product("Tuna", 2.5, 10);
        let b = product("Beef", 7.0, 10);
        let products = catalog(&[a.clone(), b.clone()]);

        let req = NewSale {
            items: vec![item(&a, 2, None), item(&b, 1, Some(6.0))],
            total_amount: Some(11.0),
        };
        let sale = req.prepare(UserId::new(), |id| products.get(&id), Utc::now()).unwrap();
        assert_eq!(sale.total_amount, Money::from_cents(1100));
        assert_eq!(sale.lines[0].line_total, Money::from_cents(500));
        assert_eq!(sale.lines[1].unit_price, Money::from_cents(600));
        assert_eq!(sale.units(), 3);
    }

    #[test]
    fn mismatched_total_is_rejected() {
        let a = product("Tuna", 2.5, 10);
        let products = catalog(&[a.clone()]);
        let req = NewSale {
            items: vec![item(&a, 2, None)],
            total_amount: Some(4.99),
        };
        let err = req.prepare(UserId::new(), |id| products.get(&id), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(m) if m.contains("does not match")));
    }

    #[test]
    fn insufficient_stock_and_unknown_product_fail() {
        let a = product("Tuna", 2.5, 1);
        let products = catalog(&[a.clone()]);

        let req = NewSale {
            items: vec![item(&a, 2, None)],
            total_amount: None,
        };
        assert!(matches!(
            req.prepare(UserId::new(), |id| products.get(&id), Utc::now()),
            Err(DomainError::InvariantViolation(_))
        ));

        let ghost = product("Ghost", 1.0, 5);
        let req = NewSale {
            items: vec![item(&ghost, 1, None)],
            total_amount: None,
        };
        assert_eq!(
            req.prepare(UserId::new(), |id| products.get(&id), Utc::now()),
            Err(DomainError::NotFound("product"))
        );
    }

    #[test]
    fn shape_rules() {
        let a = product("Tuna", 2.5, 10);
        assert!(NewSale { items: vec![], total_amount: None }.validate().is_err());
        assert!(NewSale { items: vec![item(&a, 0, None)], total_amount: None }.validate().is_err());
        assert!(
            NewSale { items: vec![item(&a, 1, None), item(&a, 2, None)], total_amount: None }
                .validate()
                .is_err()
        );
        assert!(NewSale { items: vec![item(&a, 1, Some(-2.0))], total_amount: None }.validate().is_err());
    }

    #[test]
    fn reversal_mirrors_movements() {
        let a = product("Tuna", 2.5, 10);
        let products = catalog(&[a.clone()]);
        let sale = NewSale { items: vec![item(&a, 3, None)], total_amount: None }
            .prepare(UserId::new(), |id| products.get(&id), Utc::now())
            .unwrap();

        let mut p = a.clone();
        for (_, m) in sale.movements() {
            p.apply_movement(m, Utc::now()).unwrap();
        }
        assert_eq!(p.stock_level, 7);
        for (_, m) in sale.reversal() {
            let change = p.apply_movement(m, Utc::now()).unwrap();
            let entry = sale.line_entry(&change, None, Utc::now());
            assert_eq!(entry.action, "SaleReverted");
            assert!(entry.notes.unwrap().starts_with("Qty 3"));
        }
        assert_eq!(p.stock_level, 10);
    }
}
