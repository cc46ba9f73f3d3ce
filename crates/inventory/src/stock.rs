use chrono::{DateTime, Utc};
use serde::Serialize;

use stockadoodle_activity::{ActivityEntry, ActivitySource, ProductAction};
use stockadoodle_core::{DomainError, DomainResult, ProductId, UserId};

use crate::product::Product;

pub const MAX_STOCK: u32 = 999_999;

/// A single change to a product's stock level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockMovement {
    /// Goods received.
    Restock(u32),
    /// Goods sold. Never allowed to go below zero.
    Sale(u32),
    /// Goods written off. Clamped at zero.
    Dispose(u32),
    /// Manual correction by a signed delta.
    Adjust(i64),
    /// Absolute stock count.
    Set(u32),
    /// Stock returned by undoing a sale. Saturates at [`MAX_STOCK`] so a
    /// sale can always be undone.
    Return(u32),
}

impl StockMovement {
    pub fn action(&self) -> ProductAction {
        match self {
            StockMovement::Restock(_) => ProductAction::Restock,
            StockMovement::Sale(_) => ProductAction::Sale,
            StockMovement::Dispose(_) => ProductAction::Dispose,
            StockMovement::Adjust(_) | StockMovement::Set(_) => ProductAction::Adjust,
            StockMovement::Return(_) => ProductAction::SaleReverted,
        }
    }

    /// Stock level after applying this movement to `current`.
    pub fn resolve(&self, current: u32) -> DomainResult<u32> {
        let next = match *self {
            StockMovement::Restock(q) => {
                positive(q)?;
                u64::from(current) + u64::from(q)
            }
            StockMovement::Return(q) => {
                positive(q)?;
                (u64::from(current) + u64::from(q)).min(u64::from(MAX_STOCK))
            }
            StockMovement::Sale(q) => {
                positive(q)?;
                if current < q {
                    return Err(DomainError::invariant(format!(
                        "insufficient stock: {current} available, {q} requested"
                    )));
                }
                u64::from(current - q)
            }
            StockMovement::Dispose(q) => {
                positive(q)?;
                u64::from(current.saturating_sub(q))
            }
            StockMovement::Adjust(delta) => {
                if delta == 0 {
                    return Err(DomainError::validation("delta cannot be zero"));
                }
                let next = i64::from(current)
                    .checked_add(delta)
                    .ok_or_else(|| DomainError::invariant(format!("stock level cannot exceed {MAX_STOCK}")))?;
                if next < 0 {
                    return Err(DomainError::invariant(format!(
                        "stock cannot go negative: {current} on hand, delta {delta}"
                    )));
                }
                next as u64
            }
            StockMovement::Set(level) => u64::from(level),
        };

        if next > u64::from(MAX_STOCK) {
            return Err(DomainError::invariant(format!(
                "stock level cannot exceed {MAX_STOCK}"
            )));
        }
        Ok(next as u32)
    }
}

fn positive(q: u32) -> DomainResult<()> {
    if q == 0 {
        Err(DomainError::validation("quantity must be greater than zero"))
    } else {
        Ok(())
    }
}

/// Outcome of one movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub previous: u32,
    pub current: u32,
    pub action: ProductAction,
    /// Returned units dropped because the product was already at [`MAX_STOCK`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discarded: Option<u32>,
}

impl StockChange {
    /// The activity entry recorded alongside this change.
    pub fn to_entry(
        &self,
        user_id: Option<UserId>,
        notes: Option<String>,
        source: ActivitySource,
        at: DateTime<Utc>,
    ) -> ActivityEntry {
        let mut entry = ActivityEntry::product(self.product_id, user_id, self.action, notes, source, at);
        entry.details = serde_json::json!({
            "previous": self.previous,
            "current": self.current,
        });
        if let Some(discarded) = self.discarded {
            entry.details["discarded"] = discarded.into();
        }
        entry
    }
}

impl Product {
    pub fn apply_movement(&mut self, movement: StockMovement, now: DateTime<Utc>) -> DomainResult<StockChange> {
        let previous = self.stock_level;
        let current = movement.resolve(previous)?;
        let discarded = match movement {
            StockMovement::Return(q) => Some(previous.saturating_add(q).saturating_sub(current)).filter(|&d| d > 0),
            _ => None,
        };
        self.stock_level = current;
        self.updated_at = now;
        Ok(StockChange {
            product_id: self.id,
            previous,
            current,
            action: movement.action(),
            discarded,
        })
    }
}
