use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockadoodle_activity::{ActivityEntry, ActivityPage, ActivityQuery, ActivitySummary, ProductAction};
use stockadoodle_auth::{Role, User};
use stockadoodle_core::{CategoryId, Entity, ProductId, SaleId, UserId};
use stockadoodle_inventory::{Category, Product, StockChange};
use stockadoodle_sales::{DateRange, NewSale, RetailerMetrics, Sale};

use super::{Actor, StockRequest, Store, StoreError};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    sales: HashMap<SaleId, Sale>,
    metrics: HashMap<UserId, RetailerMetrics>,
    activity: Vec<ActivityEntry>,
}

impl State {
    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn category_name_taken(&self, name: &str, except: Option<CategoryId>) -> bool {
        self.categories
            .values()
            .any(|c| c.same_name(name) && Some(c.id) != except)
    }

    fn product_name_taken(&self, name: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| p.same_name(name) && Some(p.id) != except)
    }

    fn check_product(&self, product: &Product, except: Option<ProductId>) -> Result<(), StoreError> {
        if self.product_name_taken(&product.name, except) {
            return Err(StoreError::conflict(format!(
                "a product named '{}' already exists",
                product.name
            )));
        }
        if let Some(category) = product.category_id {
            if !self.categories.contains_key(&category) {
                return Err(StoreError::not_found("category"));
            }
        }
        Ok(())
    }
}

/// Store `entity` under its own id and hand back the stored value.
fn put<E: Entity + Clone>(map: &mut HashMap<E::Id, E>, entity: E) -> E {
    map.insert(entity.id().clone(), entity.clone());
    entity
}

/// Process-local store. One lock guards all state, so every operation is
/// atomic with respect to every other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state.username_taken(&user.username, None) {
            return Err(StoreError::conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        if user.role == Role::Retailer {
            state.metrics.insert(user.id, RetailerMetrics::new(user.id));
        }
        Ok(put(&mut state.users, user))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError> {
        let state = self.read()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) {
            return Err(StoreError::not_found("user"));
        }
        if state.username_taken(&user.username, Some(user.id)) {
            return Err(StoreError::conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        if user.role == Role::Retailer {
            state
                .metrics
                .entry(user.id)
                .or_insert_with(|| RetailerMetrics::new(user.id));
        }
        Ok(put(&mut state.users, user))
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.users.remove(&id).ok_or(StoreError::not_found("user"))?;
        state.metrics.remove(&id);
        Ok(())
    }

    async fn create_category(&self, category: Category) -> Result<Category, StoreError> {
        let mut state = self.write()?;
        if state.category_name_taken(&category.name, None) {
            return Err(StoreError::conflict(format!(
                "category '{}' already exists",
                category.name
            )));
        }
        Ok(put(&mut state.categories, category))
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let mut categories: Vec<Category> = self.read()?.categories.values().cloned().collect();
        categories.sort_by_key(|c| c.name.to_lowercase());
        Ok(categories)
    }

    async fn update_category(&self, category: Category) -> Result<Category, StoreError> {
        let mut state = self.write()?;
        if !state.categories.contains_key(&category.id) {
            return Err(StoreError::not_found("category"));
        }
        if state.category_name_taken(&category.name, Some(category.id)) {
            return Err(StoreError::conflict(format!(
                "category '{}' already exists",
                category.name
            )));
        }
        Ok(put(&mut state.categories, category))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state
            .categories
            .remove(&id)
            .ok_or(StoreError::not_found("category"))?;
        for product in state.products.values_mut() {
            if product.category_id == Some(id) {
                product.category_id = None;
            }
        }
        Ok(())
    }

    async fn create_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError> {
        let mut state = self.write()?;
        state.check_product(&product, None)?;
        state.activity.push(ActivityEntry::product(
            product.id,
            actor.user_id,
            ProductAction::Created,
            None,
            actor.source,
            product.created_at,
        ));
        Ok(put(&mut state.products, product))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.read()?.products.values().cloned().collect();
        products.sort_by_key(|p| p.name.to_lowercase());
        Ok(products)
    }

    async fn update_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&product.id) {
            return Err(StoreError::not_found("product"));
        }
        state.check_product(&product, Some(product.id))?;
        state.activity.push(ActivityEntry::product(
            product.id,
            actor.user_id,
            ProductAction::Updated,
            None,
            actor.source,
            product.updated_at,
        ));
        Ok(put(&mut state.products, product))
    }

    async fn delete_product(&self, id: ProductId, actor: Actor, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let product = state
            .products
            .remove(&id)
            .ok_or(StoreError::not_found("product"))?;
        state.activity.push(ActivityEntry::product(
            id,
            actor.user_id,
            ProductAction::Deleted,
            Some(format!("Deleted '{}'", product.name)),
            actor.source,
            now,
        ));
        Ok(())
    }

    async fn apply_stock(&self, request: StockRequest, now: DateTime<Utc>) -> Result<StockChange, StoreError> {
        let mut state = self.write()?;
        let product = state
            .products
            .get_mut(&request.product_id)
            .ok_or(StoreError::not_found("product"))?;
        let change = product.apply_movement(request.movement, now)?;
        state
            .activity
            .push(change.to_entry(request.actor.user_id, request.notes, request.actor.source, now));
        Ok(change)
    }

    async fn record_sale(&self, sale: NewSale, retailer_id: UserId, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        let mut state = self.write()?;
        let sale = sale.prepare(retailer_id, |id| state.products.get(&id), now)?;

        // Work on copies so a failure part way leaves the state untouched.
        let mut touched: Vec<Product> = Vec::with_capacity(sale.lines.len());
        let mut entries = Vec::with_capacity(sale.lines.len());
        for (product_id, movement) in sale.movements() {
            let mut product = state
                .products
                .get(&product_id)
                .cloned()
                .ok_or(StoreError::not_found("product"))?;
            let change = product.apply_movement(movement, now)?;
            entries.push(sale.line_entry(&change, Some(retailer_id), now));
            touched.push(product);
        }

        for product in touched {
            state.products.insert(product.id, product);
        }
        state
            .metrics
            .entry(retailer_id)
            .or_insert_with(|| RetailerMetrics::new(retailer_id))
            .record_sale(sale.total_amount, now.date_naive());
        state.activity.extend(entries);
        Ok(put(&mut state.sales, sale))
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        Ok(self.read()?.sales.get(&id).cloned())
    }

    async fn list_sales(&self, range: DateRange) -> Result<Vec<Sale>, StoreError> {
        let mut sales: Vec<Sale> = self
            .read()?
            .sales
            .values()
            .filter(|s| range.contains(s.created_at))
            .cloned()
            .collect();
        sales.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sales)
    }

    async fn undo_sale(&self, id: SaleId, actor: Actor, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        let mut state = self.write()?;
        let sale = state
            .sales
            .get(&id)
            .cloned()
            .ok_or(StoreError::not_found("sale"))?;

        let mut touched: Vec<Product> = Vec::with_capacity(sale.lines.len());
        let mut entries = Vec::with_capacity(sale.lines.len());
        for (product_id, movement) in sale.reversal() {
            // Products deleted since the sale are skipped.
            let Some(mut product) = state.products.get(&product_id).cloned() else {
                continue;
            };
            let change = product.apply_movement(movement, now)?;
            entries.push(sale.line_entry(&change, actor.user_id, now));
            touched.push(product);
        }

        for product in touched {
            state.products.insert(product.id, product);
        }
        if let Some(metrics) = state.metrics.get_mut(&sale.retailer_id) {
            metrics.revert_sale(sale.total_amount, sale.created_at.date_naive());
        }
        state.activity.extend(entries);
        state.sales.remove(&id);
        Ok(sale)
    }

    async fn get_metrics(&self, retailer_id: UserId) -> Result<Option<RetailerMetrics>, StoreError> {
        Ok(self.read()?.metrics.get(&retailer_id).cloned())
    }

    async fn list_metrics(&self) -> Result<Vec<RetailerMetrics>, StoreError> {
        Ok(self.read()?.metrics.values().cloned().collect())
    }

    async fn append_activity(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        self.write()?.activity.push(entry);
        Ok(())
    }

    async fn query_activity(&self, query: ActivityQuery) -> Result<ActivityPage, StoreError> {
        let state = self.read()?;
        Ok(query.apply(state.activity.iter().cloned()))
    }

    async fn activity_summary(&self, now: DateTime<Utc>) -> Result<ActivitySummary, StoreError> {
        Ok(ActivitySummary::from_entries(&self.read()?.activity, now))
    }
}
