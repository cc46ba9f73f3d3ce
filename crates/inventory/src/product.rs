use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockadoodle_core::{
    CategoryId, DomainError, DomainResult, Entity, Money, ProductId, Violations, nullable,
};

use crate::stock::MAX_STOCK;

pub const NAME_MAX: usize = 120;
pub const BRAND_MAX: usize = 50;
pub const MAX_PRICE: Money = Money::from_cents(99_999_999);
pub const MAX_MIN_STOCK: u32 = 1000;
pub const DEFAULT_MIN_STOCK: u32 = 10;

/// A sellable product and its current stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    pub price: Money,
    pub stock_level: u32,
    pub min_stock_level: u32,
    pub category_id: Option<CategoryId>,
    pub expiration_date: Option<NaiveDate>,
    pub image: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Creation payload as received over JSON.
///
/// Numeric fields are signed so that out-of-range input yields a validation
/// message instead of a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub price: Option<f64>,
    #[serde(default)]
    pub stock_level: Option<i64>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    /// Base64 encoded image bytes.
    #[serde(default, alias = "image_base64")]
    pub image: Option<String>,
}

/// Partial update. Nullable fields are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub brand: Option<Option<String>>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub stock_level: Option<i64>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "nullable::deserialize")]
    pub expiration_date: Option<Option<String>>,
    #[serde(default, alias = "image_base64", deserialize_with = "nullable::deserialize")]
    pub image: Option<Option<String>>,
}

impl NewProduct {
    pub fn into_product(self, now: DateTime<Utc>) -> DomainResult<Product> {
        let mut v = Violations::new();

        let name = check_name(&mut v, &self.name);
        let brand = self.brand.as_deref().and_then(|b| check_brand(&mut v, b));
        let price = match self.price {
            Some(p) => check_price(&mut v, p),
            None => {
                v.push("price is required");
                None
            }
        };
        let stock_level = check_range(&mut v, "stock_level", self.stock_level.unwrap_or(0), MAX_STOCK);
        let min_stock_level = check_range(
            &mut v,
            "min_stock_level",
            self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK as i64),
            MAX_MIN_STOCK,
        );
        let expiration_date = self
            .expiration_date
            .as_deref()
            .and_then(|d| check_date(&mut v, d));
        let image = self.image.as_deref().and_then(|i| check_image(&mut v, i));

        v.finish()?;

        Ok(Product {
            id: ProductId::new(),
            name,
            brand,
            price: price.unwrap_or(Money::ZERO),
            stock_level: stock_level.unwrap_or(0),
            min_stock_level: min_stock_level.unwrap_or(DEFAULT_MIN_STOCK),
            category_id: self.category_id,
            expiration_date,
            image,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Product {
    /// Validate the whole patch first, then apply it. Either every field
    /// changes or none does.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let mut v = Violations::new();

        let name = patch.name.as_deref().map(|n| check_name(&mut v, n));
        let brand = patch
            .brand
            .as_ref()
            .map(|b| b.as_deref().and_then(|b| check_brand(&mut v, b)));
        let price = patch.price.map(|p| check_price(&mut v, p));
        let stock_level = patch
            .stock_level
            .map(|s| check_range(&mut v, "stock_level", s, MAX_STOCK));
        let min_stock_level = patch
            .min_stock_level
            .map(|s| check_range(&mut v, "min_stock_level", s, MAX_MIN_STOCK));
        let expiration_date = patch
            .expiration_date
            .as_ref()
            .map(|d| d.as_deref().and_then(|d| check_date(&mut v, d)));
        let image = patch
            .image
            .as_ref()
            .map(|i| i.as_deref().and_then(|i| check_image(&mut v, i)));

        v.finish()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(brand) = brand {
            self.brand = brand;
        }
        if let Some(Some(price)) = price {
            self.price = price;
        }
        if let Some(Some(stock)) = stock_level {
            self.stock_level = stock;
        }
        if let Some(Some(min)) = min_stock_level {
            self.min_stock_level = min;
        }
        if let Some(category) = patch.category_id {
            self.category_id = category;
        }
        if let Some(date) = expiration_date {
            self.expiration_date = date;
        }
        if let Some(image) = image {
            self.image = image;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_level < self.min_stock_level
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.stock_level == 0
    }

    pub fn same_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other.trim())
    }

    /// Stock value at the current price, `None` on overflow.
    pub fn stock_value(&self) -> Option<Money> {
        self.price.checked_mul(u64::from(self.stock_level))
    }

    pub fn view(&self, include_image: bool) -> ProductView {
        ProductView {
            id: self.id,
            name: self.name.clone(),
            brand: self.brand.clone(),
            price: self.price,
            stock_level: self.stock_level,
            min_stock_level: self.min_stock_level,
            category_id: self.category_id,
            expiration_date: self.expiration_date,
            has_image: self.image.is_some(),
            image_base64: if include_image {
                self.image.as_ref().map(|bytes| BASE64.encode(bytes))
            } else {
                None
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// JSON representation of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    pub price: Money,
    pub stock_level: u32,
    pub min_stock_level: u32,
    pub category_id: Option<CategoryId>,
    pub expiration_date: Option<NaiveDate>,
    pub has_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::validation(format!("invalid date '{s}' (expected YYYY-MM-DD)")))
}

fn check_name(v: &mut Violations, name: &str) -> String {
    let name = name.trim();
    v.check(name.is_empty(), "name is required");
    v.check(
        name.chars().count() > NAME_MAX,
        format!("name must be at most {NAME_MAX} characters"),
    );
    name.to_string()
}

fn check_brand(v: &mut Violations, brand: &str) -> Option<String> {
    let brand = brand.trim();
    v.check(
        brand.chars().count() > BRAND_MAX,
        format!("brand must be at most {BRAND_MAX} characters"),
    );
    (!brand.is_empty()).then(|| brand.to_string())
}

fn check_price(v: &mut Violations, price: f64) -> Option<Money> {
    match Money::from_decimal(price) {
        Ok(m) if m <= MAX_PRICE => Some(m),
        Ok(_) => {
            v.push(format!("price must be at most {MAX_PRICE}"));
            None
        }
        Err(_) => {
            v.push("price must be a non-negative amount");
            None
        }
    }
}

fn check_range(v: &mut Violations, field: &str, value: i64, max: u32) -> Option<u32> {
    if (0..=i64::from(max)).contains(&value) {
        u32::try_from(value).ok()
    } else {
        v.push(format!("{field} must be between 0 and {max}"));
        None
    }
}

fn check_date(v: &mut Violations, date: &str) -> Option<NaiveDate> {
    match parse_date(date) {
        Ok(d) => Some(d),
        Err(_) => {
            v.push(format!("invalid expiration_date '{date}' (expected YYYY-MM-DD)"));
            None
        }
    }
}

fn check_image(v: &mut Violations, image: &str) -> Option<Vec<u8>> {
    match BASE64.decode(image.trim()) {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes),
        Err(_) => {
            v.push("image must be base64 encoded");
            None
        }
    }
}
