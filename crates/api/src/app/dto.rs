use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use stockadoodle_auth::{IssuedToken, UserView};
use stockadoodle_core::{DomainError, ProductId};
use stockadoodle_sales::DateRange;

use crate::app::errors::ApiError;

// -------------------------
// Extractors
// -------------------------

/// `Json<T>` whose rejection is a JSON 400 instead of axum's plain-text body.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError::bad_request(e.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query<T>` with the same JSON rejection.
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| ApiError::bad_request(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Parse a path segment into a typed id (400 on failure).
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError::from)
}

// -------------------------
// Dates
// -------------------------

/// `start` / `end` query parameters shared by every report.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeQuery {
    pub fn range(&self) -> Result<DateRange, ApiError> {
        let start = self.start.as_deref().map(|s| parse_bound(s, false)).transpose()?;
        let end = self.end.as_deref().map(|s| parse_bound(s, true)).transpose()?;
        Ok(DateRange::new(start, end)?)
    }
}

/// RFC 3339 timestamp, or `YYYY-MM-DD` taken as the start (or end) of that day.
pub fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date '{raw}' (expected YYYY-MM-DD or RFC 3339)")))?;
    let at = if end_of_day {
        day.and_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        day.and_hms_opt(0, 0, 0)
    };
    at.map(|t| t.and_utc())
        .ok_or_else(|| ApiError::bad_request(format!("invalid date '{raw}'")))
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaSendRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct MfaVerifyRequest {
    pub username: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub include_image: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub include_image: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockAction {
    Restock,
    Adjust,
    Set,
}

#[derive(Debug, Deserialize)]
pub struct StockRequestBody {
    pub action: StockAction,
    pub quantity: Option<i64>,
    pub delta: Option<i64>,
    pub level: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisposeRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DesktopLogRequest {
    pub action: String,
    pub target: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagingQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityLogQuery {
    pub method: Option<String>,
    pub target: Option<String>,
    pub source: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub grouping: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopProductsQuery {
    pub limit: Option<usize>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Turn a stock request body into a movement, checking that the field the
/// action needs is present and in range.
pub fn stock_movement(body: &StockRequestBody) -> Result<stockadoodle_inventory::StockMovement, ApiError> {
    use stockadoodle_inventory::StockMovement;

    let unsigned = |field: &'static str, value: Option<i64>| -> Result<u32, ApiError> {
        let value = value.ok_or_else(|| ApiError::bad_request(format!("{field} is required")))?;
        u32::try_from(value)
            .map_err(|_| DomainError::validation(format!("{field} must be between 0 and {}", u32::MAX)).into())
    };

    Ok(match body.action {
        StockAction::Restock => StockMovement::Restock(unsigned("quantity", body.quantity)?),
        StockAction::Set => StockMovement::Set(unsigned("level", body.level)?),
        StockAction::Adjust => {
            StockMovement::Adjust(body.delta.ok_or_else(|| ApiError::bad_request("delta is required"))?)
        }
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserView,
}

impl SessionResponse {
    pub fn new(issued: IssuedToken, user: UserView) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_bounds_cover_whole_days() {
        let start = parse_bound("2024-05-01", false).unwrap();
        let end = parse_bound("2024-05-01", true).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert!(end > start);
        assert_eq!(end.date_naive(), start.date_naive());
    }

    #[test]
    fn rfc3339_bounds_are_kept_verbatim() {
        let at = parse_bound("2024-05-01T12:30:00Z", true).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert!(matches!(parse_bound("yesterday", false), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let q = RangeQuery {
            start: Some("2024-05-02".into()),
            end: Some("2024-05-01".into()),
        };
        assert!(matches!(q.range(), Err(ApiError::Domain(DomainError::Validation(_)))));
    }

    #[test]
    fn stock_actions_need_their_field() {
        let body = StockRequestBody {
            action: StockAction::Restock,
            quantity: None,
            delta: Some(3),
            level: None,
            notes: None,
        };
        assert!(stock_movement(&body).is_err());

        let body = StockRequestBody {
            action: StockAction::Adjust,
            quantity: None,
            delta: Some(-3),
            level: None,
            notes: None,
        };
        assert_eq!(
            stock_movement(&body).unwrap(),
            stockadoodle_inventory::StockMovement::Adjust(-3)
        );
    }
}
