use stockadoodle_core::{CategoryId, Page, PageRequest};

use crate::product::Product;

/// Catalog listing: optional category and name search, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
    pub page: PageRequest,
}

impl ProductQuery {
    /// Case-insensitive substring match on the product name.
    pub fn matches(&self, p: &Product) -> bool {
        if self.category_id.is_some() && p.category_id != self.category_id {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => p.name.to_lowercase().contains(&term.to_lowercase()),
            _ => true,
        }
    }

    pub fn apply(&self, products: Vec<Product>) -> Page<Product> {
        let mut hits: Vec<Product> = products.into_iter().filter(|p| self.matches(p)).collect();
        hits.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        self.page.apply(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::NewProduct;
    use chrono::Utc;

    fn product(name: &str) -> Product {
        NewProduct {
            name: name.into(),
            price: Some(1.0),
            ..NewProduct::default()
        }
        .into_product(Utc::now())
        .unwrap()
    }

    #[test]
    fn search_is_case_insensitive_and_sorted() {
        let q = ProductQuery {
            search: Some("TUNA".into()),
            ..ProductQuery::default()
        };
        let page = q.apply(vec![product("tuna flakes"), product("Beef"), product("Albacore Tuna")]);
        let names: Vec<_> = page.items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Albacore Tuna", "tuna flakes"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn category_filter_and_paging() {
        let cat = CategoryId::new();
        let mut products: Vec<Product> = (0..5).map(|i| product(&format!("P{i}"))).collect();
        for p in products.iter_mut().take(3) {
            p.category_id = Some(cat);
        }
        let q = ProductQuery {
            category_id: Some(cat),
            page: PageRequest::new(Some(2), Some(2)),
            ..ProductQuery::default()
        };
        let page = q.apply(products);
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "P2");
    }
}
