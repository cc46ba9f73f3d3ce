//! One behavioural suite, run against every `Store` implementation.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use stockadoodle_activity::{ActivityEntry, ActivityFilter, ActivityQuery, ActivitySource, RequestInfo};
use stockadoodle_auth::{NewUser, Role, User};
use stockadoodle_core::{DomainError, Money, SaleId};
use stockadoodle_infra::store::{Actor, InMemoryStore, SqliteStore, StockRequest, Store, StoreError};
use stockadoodle_inventory::{Category, CategoryInput, MAX_STOCK, NewProduct, Product, StockMovement};
use stockadoodle_sales::{DateRange, NewSale, SaleItemInput};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn user(username: &str, role: Role) -> User {
    User::create(
        NewUser {
            username: username.into(),
            password: "password".into(),
            email: None,
            role,
        },
        "$argon2id$stub".into(),
        t0(),
    )
    .unwrap()
}

fn category(name: &str) -> Category {
    Category::create(CategoryInput {
        name: name.into(),
        description: None,
    })
    .unwrap()
}

fn product(name: &str, price: f64, stock: i64) -> Product {
    NewProduct {
        name: name.into(),
        price: Some(price),
        stock_level: Some(stock),
        ..Default::default()
    }
    .into_product(t0())
    .unwrap()
}

fn item(p: &Product, quantity: i64) -> SaleItemInput {
    SaleItemInput {
        product_id: p.id,
        quantity,
        price: None,
    }
}

fn is_conflict(err: &StoreError) -> bool {
    matches!(err, StoreError::Domain(DomainError::Conflict(_)))
}

fn is_not_found(err: &StoreError) -> bool {
    matches!(err, StoreError::Domain(DomainError::NotFound(_)))
}

async fn product_log_count(store: &dyn Store, p: &Product) -> usize {
    store
        .query_activity(ActivityQuery::new(ActivityFilter::for_product(p.id), None, None))
        .await
        .unwrap()
        .total
}

async fn users_are_unique_and_retailers_get_metrics(store: &dyn Store) {
    let retailer = store.create_user(user("rita", Role::Retailer)).await.unwrap();
    let manager = store.create_user(user("mark", Role::Manager)).await.unwrap();

    let err = store.create_user(user("rita", Role::Admin)).await.unwrap_err();
    assert!(is_conflict(&err), "{err:?}");

    assert!(store.get_metrics(retailer.id).await.unwrap().is_some());
    assert!(store.get_metrics(manager.id).await.unwrap().is_none());

    let found = store.find_user_by_username("rita").await.unwrap().unwrap();
    assert_eq!(found, retailer);

    let retailers = store.list_users(Some(Role::Retailer)).await.unwrap();
    assert_eq!(retailers.len(), 1);
    assert_eq!(store.list_users(None).await.unwrap().len(), 2);
}

async fn promoting_to_retailer_adds_metrics_and_delete_removes_them(store: &dyn Store) {
    let mut u = store.create_user(user("sam", Role::Manager)).await.unwrap();
    u.role = Role::Retailer;
    store.update_user(u.clone()).await.unwrap();
    assert!(store.get_metrics(u.id).await.unwrap().is_some());

    store.delete_user(u.id).await.unwrap();
    assert!(store.get_user(u.id).await.unwrap().is_none());
    assert!(store.get_metrics(u.id).await.unwrap().is_none());

    let err = store.delete_user(u.id).await.unwrap_err();
    assert!(is_not_found(&err), "{err:?}");
}

async fn renaming_a_user_onto_another_name_conflicts(store: &dyn Store) {
    store.create_user(user("alpha", Role::Retailer)).await.unwrap();
    let mut beta = store.create_user(user("beta", Role::Retailer)).await.unwrap();
    beta.username = "alpha".into();
    let err = store.update_user(beta).await.unwrap_err();
    assert!(is_conflict(&err), "{err:?}");
}

async fn category_names_are_case_insensitive(store: &dyn Store) {
    store.create_category(category("Seafood")).await.unwrap();
    let err = store.create_category(category("SEAFOOD")).await.unwrap_err();
    assert!(is_conflict(&err), "{err:?}");
}

async fn deleting_a_category_unassigns_products(store: &dyn Store) {
    let meat = store.create_category(category("Meat")).await.unwrap();
    let mut p = product("Beef", 9.5, 3);
    p.category_id = Some(meat.id);
    let p = store.create_product(p, Actor::system()).await.unwrap();

    store.delete_category(meat.id).await.unwrap();
    let reloaded = store.get_product(p.id).await.unwrap().unwrap();
    assert_eq!(reloaded.category_id, None);
    assert!(store.list_categories().await.unwrap().is_empty());
}

async fn product_writes_are_checked_and_logged(store: &dyn Store) {
    let p = store.create_product(product("Rice", 2.25, 10), Actor::system()).await.unwrap();
    assert_eq!(product_log_count(store, &p).await, 1);

    let err = store
        .create_product(product("rice", 1.0, 1), Actor::system())
        .await
        .unwrap_err();
    assert!(is_conflict(&err), "{err:?}");

    let mut orphan = product("Tuna", 3.0, 1);
    orphan.category_id = Some(category("Ghost").id);
    let err = store.create_product(orphan, Actor::system()).await.unwrap_err();
    assert!(is_not_found(&err), "{err:?}");

    let mut updated = p.clone();
    updated.price = Money::from_cents(250);
    updated.image = Some(vec![0x89, 0x50, 0x4e, 0x47]);
    store.update_product(updated.clone(), Actor::system()).await.unwrap();
    assert_eq!(store.get_product(p.id).await.unwrap().unwrap(), updated);
    assert_eq!(product_log_count(store, &p).await, 2);

    store.delete_product(p.id, Actor::system(), t0()).await.unwrap();
    assert!(store.get_product(p.id).await.unwrap().is_none());
    // The log outlives the product.
    assert_eq!(product_log_count(store, &p).await, 3);
}

async fn stock_movements_log_once_and_fail_cleanly(store: &dyn Store) {
    let p = store.create_product(product("Chips", 1.5, 5), Actor::system()).await.unwrap();

    let change = store
        .apply_stock(
            StockRequest {
                product_id: p.id,
                movement: StockMovement::Restock(7),
                actor: Actor::system(),
                notes: Some("delivery".into()),
            },
            t0(),
        )
        .await
        .unwrap();
    assert_eq!((change.previous, change.current), (5, 12));

    let err = store
        .apply_stock(
            StockRequest {
                product_id: p.id,
                movement: StockMovement::Sale(13),
                actor: Actor::system(),
                notes: None,
            },
            t0(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Domain(DomainError::InvariantViolation(_))), "{err:?}");

    assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock_level, 12);
    // Created + Restock; the failed sale left nothing behind.
    assert_eq!(product_log_count(store, &p).await, 2);
}

async fn failed_sale_changes_nothing(store: &dyn Store) {
    let retailer = store.create_user(user("rhea", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Milk", 2.0, 10), Actor::system()).await.unwrap();
    let b = store.create_product(product("Eggs", 3.0, 1), Actor::system()).await.unwrap();

    let sale = NewSale {
        items: vec![item(&a, 2), item(&b, 5)],
        total_amount: None,
    };
    let err = store.record_sale(sale, retailer.id, t0()).await.unwrap_err();
    assert!(matches!(err, StoreError::Domain(DomainError::InvariantViolation(_))), "{err:?}");

    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, 10);
    assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock_level, 1);
    assert!(store.list_sales(DateRange::default()).await.unwrap().is_empty());
    assert_eq!(store.get_metrics(retailer.id).await.unwrap().unwrap().transactions, 0);
    assert_eq!(product_log_count(store, &a).await, 1);
}

async fn sale_decrements_stock_and_updates_metrics(store: &dyn Store) {
    let retailer = store.create_user(user("remy", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Bread", 2.5, 10), Actor::system()).await.unwrap();
    let b = store.create_product(product("Jam", 4.0, 3), Actor::system()).await.unwrap();

    let sale = NewSale {
        items: vec![item(&a, 2), item(&b, 3)],
        total_amount: Some(17.0),
    };
    let sale = store.record_sale(sale, retailer.id, t0()).await.unwrap();
    assert_eq!(sale.total_amount, Money::from_cents(1700));
    assert_eq!(sale.units(), 5);

    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, 8);
    assert_eq!(store.get_product(b.id).await.unwrap().unwrap().stock_level, 0);
    assert_eq!(product_log_count(store, &a).await, 2);

    let metrics = store.get_metrics(retailer.id).await.unwrap().unwrap();
    assert_eq!(metrics.transactions, 1);
    assert_eq!(metrics.current_streak, 1);
    assert_eq!(metrics.total_sales, Money::from_cents(1700));

    let stored = store.get_sale(sale.id).await.unwrap().unwrap();
    assert_eq!(stored, sale);
}

async fn sale_with_wrong_total_is_rejected(store: &dyn Store) {
    let retailer = store.create_user(user("ron", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Soda", 1.25, 10), Actor::system()).await.unwrap();
    let sale = NewSale {
        items: vec![item(&a, 2)],
        total_amount: Some(3.0),
    };
    let err = store.record_sale(sale, retailer.id, t0()).await.unwrap_err();
    assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))), "{err:?}");
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, 10);
}

async fn undo_restores_stock_and_skips_deleted_products(store: &dyn Store) {
    let retailer = store.create_user(user("una", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Tea", 3.0, 5), Actor::system()).await.unwrap();
    let b = store.create_product(product("Cake", 6.0, 5), Actor::system()).await.unwrap();

    let sale = NewSale {
        items: vec![item(&a, 1), item(&b, 2)],
        total_amount: None,
    };
    let sale = store.record_sale(sale, retailer.id, t0()).await.unwrap();
    store.delete_product(b.id, Actor::system(), t0()).await.unwrap();

    let undone = store
        .undo_sale(sale.id, Actor::api(retailer.id), t0() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(undone.id, sale.id);
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, 5);
    assert!(store.get_sale(sale.id).await.unwrap().is_none());

    // Created, Sale, SaleReverted.
    assert_eq!(product_log_count(store, &a).await, 3);

    let metrics = store.get_metrics(retailer.id).await.unwrap().unwrap();
    assert_eq!(metrics.total_sales, Money::ZERO);
    assert_eq!(metrics.sales_today, Money::ZERO);

    let err = store.undo_sale(sale.id, Actor::system(), t0()).await.unwrap_err();
    assert!(is_not_found(&err), "{err:?}");
    let err = store.undo_sale(SaleId::new(), Actor::system(), t0()).await.unwrap_err();
    assert!(is_not_found(&err), "{err:?}");
}

async fn undo_near_the_stock_ceiling_still_succeeds(store: &dyn Store) {
    let retailer = store.create_user(user("vic", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Rice", 1.0, 10), Actor::system()).await.unwrap();
    let sale = NewSale {
        items: vec![item(&a, 5)],
        total_amount: None,
    };
    let sale = store.record_sale(sale, retailer.id, t0()).await.unwrap();

    let request = StockRequest {
        product_id: a.id,
        movement: StockMovement::Set(MAX_STOCK),
        actor: Actor::system(),
        notes: None,
    };
    store.apply_stock(request, t0() + Duration::minutes(1)).await.unwrap();

    store
        .undo_sale(sale.id, Actor::system(), t0() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, MAX_STOCK);
    assert!(store.get_sale(sale.id).await.unwrap().is_none());

    let page = store
        .query_activity(ActivityQuery::new(ActivityFilter::for_product(a.id), Some(1), None))
        .await
        .unwrap();
    assert_eq!(page.logs[0].action, "SaleReverted");
    assert_eq!(page.logs[0].details["discarded"], 5);
}

async fn sales_are_listed_oldest_first_within_range(store: &dyn Store) {
    let retailer = store.create_user(user("rosa", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Salt", 1.0, 100), Actor::system()).await.unwrap();

    let mut ids = Vec::new();
    for day in 0..3 {
        let sale = NewSale {
            items: vec![item(&a, 1)],
            total_amount: None,
        };
        let at = t0() + Duration::days(day);
        ids.push(store.record_sale(sale, retailer.id, at).await.unwrap().id);
    }

    let all = store.list_sales(DateRange::default()).await.unwrap();
    assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), ids);

    let range = DateRange::new(Some(t0() + Duration::hours(12)), None).unwrap();
    let later = store.list_sales(range).await.unwrap();
    assert_eq!(later.iter().map(|s| s.id).collect::<Vec<_>>(), ids[1..]);

    let metrics = store.get_metrics(retailer.id).await.unwrap().unwrap();
    assert_eq!(metrics.current_streak, 3);
}

async fn activity_is_filtered_and_paged_newest_first(store: &dyn Store) {
    let admin = store.create_user(user("ada", Role::Admin)).await.unwrap();

    for minute in 0..5 {
        let mut request = RequestInfo::from_path("post", "/api/v1/products");
        request.status = Some(201);
        let entry = ActivityEntry::api_operation(request, Some(admin.id), t0() + Duration::minutes(minute));
        store.append_activity(entry).await.unwrap();
    }
    let desktop = ActivityEntry::user_action(
        Some(admin.id),
        "opened_inventory",
        "inventory",
        serde_json::json!({"screen": "stock"}),
        ActivitySource::DesktopApp,
        Some("10.0.0.7".into()),
        t0() + Duration::hours(1),
    );
    store.append_activity(desktop.clone()).await.unwrap();

    let page = store
        .query_activity(ActivityQuery::new(ActivityFilter::for_user(admin.id), Some(2), Some(0)))
        .await
        .unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(page.count, 2);
    assert_eq!(page.logs[0], desktop);
    assert!(page.logs[0].logged_at > page.logs[1].logged_at);

    let filter = ActivityFilter {
        method: Some("POST".into()),
        since: Some(t0() + Duration::minutes(3)),
        ..Default::default()
    };
    let page = store.query_activity(ActivityQuery::new(filter, None, None)).await.unwrap();
    assert_eq!(page.total, 2);
    assert!(page.logs.iter().all(|e| e.method() == Some("POST")));

    let filter = ActivityFilter {
        source: Some(ActivitySource::DesktopApp),
        ..Default::default()
    };
    let page = store.query_activity(ActivityQuery::new(filter, None, None)).await.unwrap();
    assert_eq!(page.logs, vec![desktop]);

    let summary = store.activity_summary(t0() + Duration::hours(2)).await.unwrap();
    assert_eq!(summary.total_logs, 6);
    assert_eq!(summary.recent_24h, 6);
    assert_eq!(summary.by_method.get("POST"), Some(&5));
    assert_eq!(summary.by_source.get("Desktop App"), Some(&1));
    assert_eq!(summary.by_entity.get("product"), Some(&5));
}

async fn sqlite_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:").await.unwrap()
}

/// Many retailers' tills hitting the store at once: every sale commits.
async fn concurrent_sales_all_commit<S: Store + 'static>(store: Arc<S>) {
    const SALES: u32 = 20;

    let retailer = store.create_user(user("rush", Role::Retailer)).await.unwrap();
    let a = store.create_product(product("Gum", 0.5, 100), Actor::system()).await.unwrap();

    let tasks: Vec<_> = (0..SALES)
        .map(|_| {
            let store = store.clone();
            let sale = NewSale {
                items: vec![item(&a, 1)],
                total_amount: None,
            };
            tokio::spawn(async move { store.record_sale(sale, retailer.id, t0()).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock_level, 100 - SALES);
    let metrics = store.get_metrics(retailer.id).await.unwrap().unwrap();
    assert_eq!(metrics.transactions, u64::from(SALES));
    assert_eq!(product_log_count(store.as_ref(), &a).await, 1 + SALES as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_all_commit_in_memory() {
    concurrent_sales_all_commit(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_all_commit_on_file() {
    let path = std::env::temp_dir().join(format!("stockadoodle-{}.db", SaleId::new()));
    let store = SqliteStore::connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .unwrap();
    concurrent_sales_all_commit(Arc::new(store)).await;

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

macro_rules! contract {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(&super::InMemoryStore::new()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    let store = super::sqlite_store().await;
                    super::$name(&store).await;
                }
            )*
        }
    };
}

contract!(
    users_are_unique_and_retailers_get_metrics,
    promoting_to_retailer_adds_metrics_and_delete_removes_them,
    renaming_a_user_onto_another_name_conflicts,
    category_names_are_case_insensitive,
    deleting_a_category_unassigns_products,
    product_writes_are_checked_and_logged,
    stock_movements_log_once_and_fail_cleanly,
    failed_sale_changes_nothing,
    sale_decrements_stock_and_updates_metrics,
    sale_with_wrong_total_is_rejected,
    undo_restores_stock_and_skips_deleted_products,
    undo_near_the_stock_ceiling_still_succeeds,
    sales_are_listed_oldest_first_within_range,
    activity_is_filtered_and_paged_newest_first,
);
