//! The reporting endpoints. Every report is computed on demand from the
//! store; nothing is cached.

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Json, Router};
use serde_json::json;

use stockadoodle_auth::Permission;
use stockadoodle_core::Money;
use stockadoodle_inventory::{CategoryCount, InventoryAlerts, InventoryValuation, category_breakdown};
use stockadoodle_sales::{
    PeriodGrouping, PeriodTotal, ProductSales, SalesSummary, revenue_by_retailer, sales_by_period,
    top_products,
};

use crate::app::dto::{ApiQuery, DaysQuery, PeriodQuery, RangeQuery, TopProductsQuery};
use crate::app::errors::ApiError;
use crate::app::routes::{inventory, retailers};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/sales", get(sales_summary))
        .route("/sales/by-period", get(sales_per_period))
        .route("/top-products", get(top_selling))
        .route("/retailers", get(retailer_performance))
        .route("/inventory", get(inventory_valuation))
        .route("/categories", get(category_distribution))
        .route("/alerts", get(stock_alerts))
}

pub async fn sales_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<RangeQuery>,
) -> Result<Json<SalesSummary>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let range = q.range()?;
    let sales = services.store.list_sales(range).await?;
    Ok(Json(SalesSummary::from_sales(&sales, range)))
}

/// GET /reports/sales/by-period?grouping=daily|weekly|monthly
pub async fn sales_per_period(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<PeriodQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let grouping: PeriodGrouping = q.grouping.as_deref().unwrap_or("daily").parse()?;
    let range = RangeQuery {
        start: q.start,
        end: q.end,
    }
    .range()?;

    let sales = services.store.list_sales(range).await?;
    let periods: Vec<PeriodTotal> = sales_by_period(&sales, range, grouping);
    Ok(Json(json!({ "grouping": grouping, "periods": periods })))
}

pub async fn top_selling(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<TopProductsQuery>,
) -> Result<Json<Vec<ProductSales>>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let range = RangeQuery {
        start: q.start,
        end: q.end,
    }
    .range()?;
    let sales = services.store.list_sales(range).await?;
    Ok(Json(top_products(&sales, range, q.limit)))
}

/// GET /reports/retailers - revenue in range plus lifetime metrics.
pub async fn retailer_performance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<RangeQuery>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let range = q.range()?;
    let sales = services.store.list_sales(range).await?;
    let revenue = revenue_by_retailer(&sales, range);
    let today = services.today();

    let mut rows: Vec<(Money, serde_json::Value)> = retailers::retailer_rows(&services)
        .await?
        .into_iter()
        .map(|(metrics, username)| {
            let r = revenue.iter().find(|r| r.retailer_id == metrics.retailer_id);
            let amount = r.map_or(Money::ZERO, |r| r.revenue);
            let row = json!({
                "retailer_id": metrics.retailer_id,
                "username": username,
                "revenue": amount,
                "transactions": r.map_or(0, |r| r.transactions),
                "units_sold": r.map_or(0, |r| r.units_sold),
                "current_streak": metrics.streak_on(today),
                "best_streak": metrics.best_streak,
                "total_sales": metrics.total_sales,
            });
            (amount, row)
        })
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(Json(rows.into_iter().map(|(_, row)| row).collect()))
}

pub async fn inventory_valuation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<InventoryValuation>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let products = services.store.list_products().await?;
    Ok(Json(InventoryValuation::compute(&products)?))
}

pub async fn category_distribution(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<CategoryCount>>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    let products = services.store.list_products().await?;
    let categories = services.store.list_categories().await?;
    Ok(Json(category_breakdown(&products, &categories)))
}

pub async fn stock_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(q): ApiQuery<DaysQuery>,
) -> Result<Json<InventoryAlerts>, ApiError> {
    authz::require(&principal, &Permission::REPORTS_READ)?;
    Ok(Json(inventory::scan(&services, q.days).await?))
}
