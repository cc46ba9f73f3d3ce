//! SQLite-backed store (sqlx).
//!
//! ## Encoding
//!
//! | Rust type            | Column                                   |
//! |----------------------|------------------------------------------|
//! | typed ids            | `TEXT` (hyphenated UUID)                 |
//! | `DateTime<Utc>`      | `TEXT`, RFC 3339 with nanoseconds, `Z`   |
//! | `NaiveDate`          | `TEXT`, `YYYY-MM-DD`                     |
//! | `Money`              | `INTEGER` cents                          |
//! | sale lines / details | `TEXT` JSON                              |
//!
//! The fixed-width timestamp format keeps lexical and chronological order
//! identical, so range filters compare strings.
//!
//! Multi-row writes run in a single transaction on the one writer
//! connection; reads use a separate pool. An in-memory URL
//! (`sqlite::memory:`) is pinned to one connection that never expires, since
//! every new connection would open a fresh empty database.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use stockadoodle_activity::{
    ActivityEntry, ActivityPage, ActivityQuery, ActivitySource, ActivitySummary, ProductAction,
    RequestInfo,
};
use stockadoodle_auth::{Role, User};
use stockadoodle_core::{CategoryId, DomainError, LogId, Money, ProductId, SaleId, UserId};
use stockadoodle_inventory::{Category, Product, StockChange};
use stockadoodle_sales::{DateRange, NewSale, RetailerMetrics, Sale, SaleLine};

use super::{Actor, StockRequest, Store, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT NULL,
        role          TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        active        INTEGER NOT NULL,
        created_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
        description TEXT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL UNIQUE COLLATE NOCASE,
        brand           TEXT NULL,
        price_cents     INTEGER NOT NULL,
        stock_level     INTEGER NOT NULL,
        min_stock_level INTEGER NOT NULL,
        category_id     TEXT NULL,
        expiration_date TEXT NULL,
        image           BLOB NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sales (
        id          TEXT PRIMARY KEY,
        retailer_id TEXT NOT NULL,
        total_cents INTEGER NOT NULL,
        lines       TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS sales_created_at ON sales (created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS retailer_metrics (
        retailer_id       TEXT PRIMARY KEY,
        current_streak    INTEGER NOT NULL,
        best_streak       INTEGER NOT NULL,
        last_sale_date    TEXT NULL,
        sales_today_cents INTEGER NOT NULL,
        total_sales_cents INTEGER NOT NULL,
        transactions      INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS activity_log (
        id            TEXT PRIMARY KEY,
        product_id    TEXT NULL,
        user_id       TEXT NULL,
        action        TEXT NOT NULL,
        source        TEXT NOT NULL,
        notes         TEXT NULL,
        details       TEXT NOT NULL,
        method        TEXT NULL,
        path          TEXT NULL,
        target_entity TEXT NULL,
        target_id     TEXT NULL,
        ip_address    TEXT NULL,
        status        INTEGER NULL,
        logged_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS activity_log_logged_at ON activity_log (logged_at)",
    "CREATE INDEX IF NOT EXISTS activity_log_product ON activity_log (product_id)",
    "CREATE INDEX IF NOT EXISTS activity_log_user ON activity_log (user_id)",
];

const READERS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACTIVITY_WHERE: &str = r#"
    WHERE (?1 IS NULL OR product_id = ?1)
      AND (?2 IS NULL OR user_id = ?2)
      AND (?3 IS NULL OR action = ?3)
      AND (?4 IS NULL OR source = ?4)
      AND (?5 IS NULL OR upper(method) = upper(?5))
      AND (?6 IS NULL OR target_entity = ?6)
      AND (?7 IS NULL OR logged_at >= ?7)
      AND (?8 IS NULL OR logged_at <= ?8)
"#;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Readers. In WAL mode they never wait on the writer.
    pool: SqlitePool,
    /// The single connection every write goes through. Concurrent write
    /// transactions wait for it instead of racing for the database lock.
    writer: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        if in_memory {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| map_sqlx_error("connect", e))?;
            let store = Self {
                writer: pool.clone(),
                pool,
            };
            store.migrate().await?;
            return Ok(store);
        }

        let options = options.journal_mode(SqliteJournalMode::Wal);
        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self {
            pool: writer.clone(),
            writer,
        };
        // The schema must exist before readers open, so they see it.
        store.migrate().await?;

        let pool = SqlitePoolOptions::new()
            .max_connections(READERS)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool, ..store })
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.writer)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("create_user", e))?;
        if find_user_by(&mut tx, "username", &user.username).await?.is_some() {
            return Err(StoreError::conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        write_user(&mut tx, &user).await?;
        if user.role == Role::Retailer {
            write_metrics(&mut tx, &RetailerMetrics::new(user.id)).await?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("create_user", e))?;
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_user", e))?;
        find_user_by(&mut conn, "id", &id.to_string()).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        find_user_by(&mut conn, "username", username).await
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("SELECT * FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY username")
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn update_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("update_user", e))?;
        if find_user_by(&mut tx, "id", &user.id.to_string()).await?.is_none() {
            return Err(StoreError::not_found("user"));
        }
        if let Some(other) = find_user_by(&mut tx, "username", &user.username).await? {
            if other.id != user.id {
                return Err(StoreError::conflict(format!(
                    "username '{}' is already taken",
                    user.username
                )));
            }
        }
        write_user(&mut tx, &user).await?;
        if user.role == Role::Retailer && fetch_metrics(&mut tx, user.id).await?.is_none() {
            write_metrics(&mut tx, &RetailerMetrics::new(user.id)).await?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("update_user", e))?;
        Ok(user)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("delete_user", e))?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("user"));
        }
        sqlx::query("DELETE FROM retailer_metrics WHERE retailer_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_user", e))?;
        Ok(())
    }

    async fn create_category(&self, category: Category) -> Result<Category, StoreError> {
        sqlx::query("INSERT INTO categories (id, name, description) VALUES (?1, ?2, ?3)")
            .bind(category.id.to_string())
            .bind(&category.name)
            .bind(&category.description)
            .execute(&self.writer)
            .await
            .map_err(|e| match map_sqlx_error("create_category", e) {
                StoreError::Domain(DomainError::Conflict(_)) => {
                    StoreError::conflict(format!("category '{}' already exists", category.name))
                }
                other => other,
            })?;
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT * FROM categories ORDER BY name COLLATE NOCASE")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;
        rows.iter().map(category_from_row).collect()
    }

    async fn update_category(&self, category: Category) -> Result<Category, StoreError> {
        let updated = sqlx::query("UPDATE categories SET name = ?2, description = ?3 WHERE id = ?1")
            .bind(category.id.to_string())
            .bind(&category.name)
            .bind(&category.description)
            .execute(&self.writer)
            .await
            .map_err(|e| match map_sqlx_error("update_category", e) {
                StoreError::Domain(DomainError::Conflict(_)) => {
                    StoreError::conflict(format!("category '{}' already exists", category.name))
                }
                other => other,
            })?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("category"));
        }
        Ok(category)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("delete_category", e))?;
        let deleted = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("category"));
        }
        sqlx::query("UPDATE products SET category_id = NULL WHERE category_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_category", e))?;
        Ok(())
    }

    async fn create_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("create_product", e))?;
        check_product(&mut tx, &product, None).await?;
        write_product(&mut tx, &product).await?;
        let entry = ActivityEntry::product(
            product.id,
            actor.user_id,
            ProductAction::Created,
            None,
            actor.source,
            product.created_at,
        );
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("create_product", e))?;
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_product", e))?;
        fetch_product(&mut conn, id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY name COLLATE NOCASE")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(&self, product: Product, actor: Actor) -> Result<Product, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("update_product", e))?;
        if fetch_product(&mut tx, product.id).await?.is_none() {
            return Err(StoreError::not_found("product"));
        }
        check_product(&mut tx, &product, Some(product.id)).await?;
        write_product(&mut tx, &product).await?;
        let entry = ActivityEntry::product(
            product.id,
            actor.user_id,
            ProductAction::Updated,
            None,
            actor.source,
            product.updated_at,
        );
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(product)
    }

    async fn delete_product(&self, id: ProductId, actor: Actor, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("delete_product", e))?;
        let product = fetch_product(&mut tx, id)
            .await?
            .ok_or(StoreError::not_found("product"))?;
        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        let entry = ActivityEntry::product(
            id,
            actor.user_id,
            ProductAction::Deleted,
            Some(format!("Deleted '{}'", product.name)),
            actor.source,
            now,
        );
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(())
    }

    async fn apply_stock(&self, request: StockRequest, now: DateTime<Utc>) -> Result<StockChange, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("apply_stock", e))?;
        let mut product = fetch_product(&mut tx, request.product_id)
            .await?
            .ok_or(StoreError::not_found("product"))?;
        let change = product.apply_movement(request.movement, now)?;
        write_stock(&mut tx, &product).await?;
        let entry = change.to_entry(request.actor.user_id, request.notes, request.actor.source, now);
        insert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("apply_stock", e))?;
        Ok(change)
    }

    async fn record_sale(&self, sale: NewSale, retailer_id: UserId, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        sale.validate()?;
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("record_sale", e))?;

        let mut products = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            if let Some(p) = fetch_product(&mut tx, item.product_id).await? {
                products.push(p);
            }
        }
        let sale = sale.prepare(
            retailer_id,
            |id| products.iter().find(|p| p.id == id),
            now,
        )?;

        for (product_id, movement) in sale.movements() {
            let Some(product) = products.iter_mut().find(|p| p.id == product_id) else {
                return Err(StoreError::not_found("product"));
            };
            let change = product.apply_movement(movement, now)?;
            write_stock(&mut tx, product).await?;
            insert_entry(&mut tx, &sale.line_entry(&change, Some(retailer_id), now)).await?;
        }

        let mut metrics = fetch_metrics(&mut tx, retailer_id)
            .await?
            .unwrap_or_else(|| RetailerMetrics::new(retailer_id));
        metrics.record_sale(sale.total_amount, now.date_naive());
        write_metrics(&mut tx, &metrics).await?;

        let lines = serde_json::to_string(&sale.lines).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        sqlx::query(
            "INSERT INTO sales (id, retailer_id, total_cents, lines, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(sale.id.to_string())
        .bind(sale.retailer_id.to_string())
        .bind(to_i64(sale.total_amount.cents())?)
        .bind(lines)
        .bind(ts(sale.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_sale", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("record_sale", e))?;
        Ok(sale)
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_sale", e))?;
        fetch_sale(&mut conn, id).await
    }

    async fn list_sales(&self, range: DateRange) -> Result<Vec<Sale>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sales
            WHERE (?1 IS NULL OR created_at >= ?1)
              AND (?2 IS NULL OR created_at <= ?2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(range.start.map(ts))
        .bind(range.end.map(ts))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sales", e))?;
        rows.iter().map(sale_from_row).collect()
    }

    async fn undo_sale(&self, id: SaleId, actor: Actor, now: DateTime<Utc>) -> Result<Sale, StoreError> {
        let mut tx = self.writer.begin().await.map_err(|e| map_sqlx_error("undo_sale", e))?;
        let sale = fetch_sale(&mut tx, id).await?.ok_or(StoreError::not_found("sale"))?;

        for (product_id, movement) in sale.reversal() {
            // Products deleted since the sale are skipped.
            let Some(mut product) = fetch_product(&mut tx, product_id).await? else {
                continue;
            };
            let change = product.apply_movement(movement, now)?;
            write_stock(&mut tx, &product).await?;
            insert_entry(&mut tx, &sale.line_entry(&change, actor.user_id, now)).await?;
        }

        if let Some(mut metrics) = fetch_metrics(&mut tx, sale.retailer_id).await? {
            metrics.revert_sale(sale.total_amount, sale.created_at.date_naive());
            write_metrics(&mut tx, &metrics).await?;
        }

        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("undo_sale", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("undo_sale", e))?;
        Ok(sale)
    }

    async fn get_metrics(&self, retailer_id: UserId) -> Result<Option<RetailerMetrics>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("get_metrics", e))?;
        fetch_metrics(&mut conn, retailer_id).await
    }

    async fn list_metrics(&self) -> Result<Vec<RetailerMetrics>, StoreError> {
        let rows = sqlx::query("SELECT * FROM retailer_metrics")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_metrics", e))?;
        rows.iter().map(metrics_from_row).collect()
    }

    async fn append_activity(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        let mut conn = self
            .writer
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("append_activity", e))?;
        insert_entry(&mut conn, &entry).await
    }

    async fn query_activity(&self, query: ActivityQuery) -> Result<ActivityPage, StoreError> {
        let f = &query.filter;
        let params: [Option<String>; 8] = [
            f.product_id.map(|id| id.to_string()),
            f.user_id.map(|id| id.to_string()),
            f.action.clone(),
            f.source.map(|s| s.as_str().to_string()),
            f.method.clone(),
            f.target_entity.clone(),
            f.since.map(ts),
            f.until.map(ts),
        ];

        let count_sql = format!("SELECT COUNT(*) AS total FROM activity_log {ACTIVITY_WHERE}");
        let mut count = sqlx::query(&count_sql);
        for p in &params {
            count = count.bind(p.clone());
        }
        let total: i64 = count
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_activity", e))?
            .try_get("total")
            .map_err(|e| map_sqlx_error("query_activity", e))?;

        let select_sql = format!(
            "SELECT * FROM activity_log {ACTIVITY_WHERE} ORDER BY logged_at DESC, id DESC LIMIT ?9 OFFSET ?10"
        );
        let mut select = sqlx::query(&select_sql);
        for p in &params {
            select = select.bind(p.clone());
        }
        let rows = select
            .bind(i64::from(query.limit()))
            .bind(i64::from(query.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_activity", e))?;

        let logs = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(ActivityPage::new(logs, usize::try_from(total).unwrap_or(0), &query))
    }

    async fn activity_summary(&self, now: DateTime<Utc>) -> Result<ActivitySummary, StoreError> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(logged_at >= ?1), 0) AS recent FROM activity_log",
        )
        .bind(ts(now - chrono::Duration::hours(24)))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("activity_summary", e))?;

        let mut summary = ActivitySummary {
            total_logs: to_usize(col(&totals, "total")?)?,
            recent_24h: to_usize(col(&totals, "recent")?)?,
            ..ActivitySummary::default()
        };

        for (column, map) in [
            ("method", &mut summary.by_method),
            ("source", &mut summary.by_source),
            ("target_entity", &mut summary.by_entity),
        ] {
            let sql = format!(
                "SELECT {column} AS k, COUNT(*) AS n FROM activity_log WHERE {column} IS NOT NULL GROUP BY {column}"
            );
            let rows = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("activity_summary", e))?;
            for row in &rows {
                map.insert(col(row, "k")?, to_usize(col(row, "n")?)?);
            }
        }
        Ok(summary)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{s}': {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| StoreError::Corrupt(format!("date '{s}': {e}")))
}

fn parse_id<T>(s: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    s.parse().map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| map_sqlx_error("decode", e))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("value {value} out of range")))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative value {value}")))
}

fn to_u32(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("value {value} out of range")))
}

fn to_usize(value: i64) -> Result<usize, StoreError> {
    usize::try_from(value).map_err(|_| StoreError::Corrupt(format!("value {value} out of range")))
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let role: String = col(row, "role")?;
    Ok(User {
        id: parse_id(&col::<String>(row, "id")?)?,
        username: col(row, "username")?,
        email: col(row, "email")?,
        role: role.parse().map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))?,
        password_hash: col(row, "password_hash")?,
        active: col(row, "active")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
    })
}

fn category_from_row(row: &SqliteRow) -> Result<Category, StoreError> {
    Ok(Category {
        id: parse_id(&col::<String>(row, "id")?)?,
        name: col(row, "name")?,
        description: col(row, "description")?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: parse_id(&col::<String>(row, "id")?)?,
        name: col(row, "name")?,
        brand: col(row, "brand")?,
        price: Money::from_cents(to_u64(col(row, "price_cents")?)?),
        stock_level: to_u32(col(row, "stock_level")?)?,
        min_stock_level: to_u32(col(row, "min_stock_level")?)?,
        category_id: col::<Option<String>>(row, "category_id")?
            .as_deref()
            .map(parse_id::<CategoryId>)
            .transpose()?,
        expiration_date: col::<Option<String>>(row, "expiration_date")?
            .as_deref()
            .map(parse_date)
            .transpose()?,
        image: col(row, "image")?,
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
        updated_at: parse_ts(&col::<String>(row, "updated_at")?)?,
    })
}

fn sale_from_row(row: &SqliteRow) -> Result<Sale, StoreError> {
    let lines: String = col(row, "lines")?;
    let lines: Vec<SaleLine> =
        serde_json::from_str(&lines).map_err(|e| StoreError::Corrupt(format!("sale lines: {e}")))?;
    Ok(Sale {
        id: parse_id(&col::<String>(row, "id")?)?,
        retailer_id: parse_id(&col::<String>(row, "retailer_id")?)?,
        lines,
        total_amount: Money::from_cents(to_u64(col(row, "total_cents")?)?),
        created_at: parse_ts(&col::<String>(row, "created_at")?)?,
    })
}

fn metrics_from_row(row: &SqliteRow) -> Result<RetailerMetrics, StoreError> {
    Ok(RetailerMetrics {
        retailer_id: parse_id(&col::<String>(row, "retailer_id")?)?,
        current_streak: to_u32(col(row, "current_streak")?)?,
        best_streak: to_u32(col(row, "best_streak")?)?,
        last_sale_date: col::<Option<String>>(row, "last_sale_date")?
            .as_deref()
            .map(parse_date)
            .transpose()?,
        sales_today: Money::from_cents(to_u64(col(row, "sales_today_cents")?)?),
        total_sales: Money::from_cents(to_u64(col(row, "total_sales_cents")?)?),
        transactions: to_u64(col(row, "transactions")?)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<ActivityEntry, StoreError> {
    let source: String = col(row, "source")?;
    let details: String = col(row, "details")?;
    let request = match (col::<Option<String>>(row, "method")?, col::<Option<String>>(row, "path")?) {
        (Some(method), Some(path)) => Some(RequestInfo {
            method,
            path,
            target_entity: col(row, "target_entity")?,
            target_id: col(row, "target_id")?,
            ip_address: col(row, "ip_address")?,
            status: col::<Option<i64>>(row, "status")?.and_then(|s| u16::try_from(s).ok()),
        }),
        _ => None,
    };

    Ok(ActivityEntry {
        id: parse_id::<LogId>(&col::<String>(row, "id")?)?,
        product_id: col::<Option<String>>(row, "product_id")?
            .as_deref()
            .map(parse_id::<ProductId>)
            .transpose()?,
        user_id: col::<Option<String>>(row, "user_id")?
            .as_deref()
            .map(parse_id::<UserId>)
            .transpose()?,
        action: col(row, "action")?,
        source: source
            .parse::<ActivitySource>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        notes: col(row, "notes")?,
        details: serde_json::from_str(&details).map_err(|e| StoreError::Corrupt(format!("details: {e}")))?,
        request,
        logged_at: parse_ts(&col::<String>(row, "logged_at")?)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level reads and writes (usable inside a transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn find_user_by(conn: &mut SqliteConnection, column: &str, value: &str) -> Result<Option<User>, StoreError> {
    let sql = match column {
        "id" => "SELECT * FROM users WHERE id = ?1",
        _ => "SELECT * FROM users WHERE username = ?1",
    };
    let row = sqlx::query(sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;
    row.as_ref().map(user_from_row).transpose()
}

async fn write_user(conn: &mut SqliteConnection, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, role, password_hash, active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            email = excluded.email,
            role = excluded.role,
            password_hash = excluded.password_hash,
            active = excluded.active
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(&user.password_hash)
    .bind(user.active)
    .bind(ts(user.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_user", e))?;
    Ok(())
}

async fn check_product(
    conn: &mut SqliteConnection,
    product: &Product,
    except: Option<ProductId>,
) -> Result<(), StoreError> {
    let clash = sqlx::query("SELECT id FROM products WHERE name = ?1 COLLATE NOCASE AND (?2 IS NULL OR id <> ?2)")
        .bind(&product.name)
        .bind(except.map(|id| id.to_string()))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("check_product", e))?;
    if clash.is_some() {
        return Err(StoreError::conflict(format!(
            "a product named '{}' already exists",
            product.name
        )));
    }

    if let Some(category) = product.category_id {
        let known = sqlx::query("SELECT id FROM categories WHERE id = ?1")
            .bind(category.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("check_product", e))?;
        if known.is_none() {
            return Err(StoreError::not_found("category"));
        }
    }
    Ok(())
}

async fn fetch_product(conn: &mut SqliteConnection, id: ProductId) -> Result<Option<Product>, StoreError> {
    let row = sqlx::query("SELECT * FROM products WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_product", e))?;
    row.as_ref().map(product_from_row).transpose()
}

async fn write_product(conn: &mut SqliteConnection, p: &Product) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, brand, price_cents, stock_level, min_stock_level,
            category_id, expiration_date, image, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            brand = excluded.brand,
            price_cents = excluded.price_cents,
            stock_level = excluded.stock_level,
            min_stock_level = excluded.min_stock_level,
            category_id = excluded.category_id,
            expiration_date = excluded.expiration_date,
            image = excluded.image,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(p.id.to_string())
    .bind(&p.name)
    .bind(&p.brand)
    .bind(to_i64(p.price.cents())?)
    .bind(i64::from(p.stock_level))
    .bind(i64::from(p.min_stock_level))
    .bind(p.category_id.map(|id| id.to_string()))
    .bind(p.expiration_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(&p.image)
    .bind(ts(p.created_at))
    .bind(ts(p.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_product", e))?;
    Ok(())
}

async fn write_stock(conn: &mut SqliteConnection, p: &Product) -> Result<(), StoreError> {
    sqlx::query("UPDATE products SET stock_level = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(p.id.to_string())
        .bind(i64::from(p.stock_level))
        .bind(ts(p.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_stock", e))?;
    Ok(())
}

async fn fetch_sale(conn: &mut SqliteConnection, id: SaleId) -> Result<Option<Sale>, StoreError> {
    let row = sqlx::query("SELECT * FROM sales WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_sale", e))?;
    row.as_ref().map(sale_from_row).transpose()
}

async fn fetch_metrics(conn: &mut SqliteConnection, retailer_id: UserId) -> Result<Option<RetailerMetrics>, StoreError> {
    let row = sqlx::query("SELECT * FROM retailer_metrics WHERE retailer_id = ?1")
        .bind(retailer_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_metrics", e))?;
    row.as_ref().map(metrics_from_row).transpose()
}

async fn write_metrics(conn: &mut SqliteConnection, m: &RetailerMetrics) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO retailer_metrics (
            retailer_id, current_streak, best_streak, last_sale_date,
            sales_today_cents, total_sales_cents, transactions
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(retailer_id) DO UPDATE SET
            current_streak = excluded.current_streak,
            best_streak = excluded.best_streak,
            last_sale_date = excluded.last_sale_date,
            sales_today_cents = excluded.sales_today_cents,
            total_sales_cents = excluded.total_sales_cents,
            transactions = excluded.transactions
        "#,
    )
    .bind(m.retailer_id.to_string())
    .bind(i64::from(m.current_streak))
    .bind(i64::from(m.best_streak))
    .bind(m.last_sale_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(to_i64(m.sales_today.cents())?)
    .bind(to_i64(m.total_sales.cents())?)
    .bind(to_i64(m.transactions)?)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_metrics", e))?;
    Ok(())
}

async fn insert_entry(conn: &mut SqliteConnection, e: &ActivityEntry) -> Result<(), StoreError> {
    let details = serde_json::to_string(&e.details).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let req = e.request.as_ref();
    sqlx::query(
        r#"
        INSERT INTO activity_log (
            id, product_id, user_id, action, source, notes, details,
            method, path, target_entity, target_id, ip_address, status, logged_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(e.id.to_string())
    .bind(e.product_id.map(|id| id.to_string()))
    .bind(e.user_id.map(|id| id.to_string()))
    .bind(&e.action)
    .bind(e.source.as_str())
    .bind(&e.notes)
    .bind(details)
    .bind(req.map(|r| r.method.clone()))
    .bind(req.map(|r| r.path.clone()))
    .bind(req.and_then(|r| r.target_entity.clone()))
    .bind(req.and_then(|r| r.target_id.clone()))
    .bind(req.and_then(|r| r.ip_address.clone()))
    .bind(req.and_then(|r| r.status).map(i64::from))
    .bind(ts(e.logged_at))
    .execute(&mut *conn)
    .await
    .map_err(|err| map_sqlx_error("insert_entry", err))?;
    Ok(())
}

/// Map sqlx errors into store errors. Unique violations become conflicts.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::conflict(format!("duplicate value in {operation}: {}", db_err.message()))
        }
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Database(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}
