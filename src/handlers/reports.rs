use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use super::common::{csv_response, require_date, success_response, Bound};
use super::transactions::TransactionQuery;
use crate::{
    auth::AuthRouterExt,
    entities::UserRole,
    errors::ApiError,
    services::reports::{Dashboard, GroupBy, InventoryReport, RevenueReport, TransactionReport},
    AppState,
};

const DEFAULT_DASHBOARD_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardQuery {
    /// Window for revenue and top sellers, 1 to 3650
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RevenueQuery {
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
    #[serde(rename = "groupBy", alias = "group_by")]
    pub group_by: Option<GroupBy>,
}

impl RevenueQuery {
    fn bounds(&self) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>, GroupBy), ApiError> {
        let start = require_date("startDate", self.start_date.as_deref(), Bound::Start)?;
        let end = require_date("endDate", self.end_date.as_deref(), Bound::End)?;
        Ok((start, end, self.group_by.unwrap_or_default()))
    }
}

/// Reporting is restricted to managers and admins.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/revenue", get(revenue_report))
        .route("/revenue/export", get(export_revenue))
        .route("/inventory", get(inventory_report))
        .route("/inventory/export", get(export_inventory))
        .route("/transactions", get(transaction_report))
        .route("/transactions/export", get(export_transactions))
        .with_role(UserRole::Manager)
}

fn export_name(kind: &str) -> String {
    format!("{}-{}.csv", kind, Utc::now().format("%Y%m%d%H%M%S"))
}

#[utoipa::path(
    get,
    path = "/api/reports/dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Headline figures", body = Dashboard),
        (status = 400, description = "days out of range", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let days = query.days.unwrap_or(DEFAULT_DASHBOARD_DAYS);
    Ok(success_response(state.services.reports.dashboard(days).await?))
}

#[utoipa::path(
    get,
    path = "/api/reports/revenue",
    params(RevenueQuery),
    responses(
        (status = 200, description = "Revenue, cost and profit per period", body = RevenueReport),
        (status = 400, description = "Missing or inverted dates", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn revenue_report(
    State(state): State<AppState>,
    query: Result<Query<RevenueQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let (start, end, group_by) = query.bounds()?;
    let report = state.services.reports.revenue(start, end, group_by).await?;
    Ok(success_response(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/revenue/export",
    params(RevenueQuery),
    responses(
        (status = 200, description = "Revenue report as CSV", content_type = "text/csv", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn export_revenue(
    State(state): State<AppState>,
    query: Result<Query<RevenueQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let (start, end, group_by) = query.bounds()?;
    let body = state
        .services
        .reports
        .revenue_csv(start, end, group_by)
        .await?;
    Ok(csv_response(&export_name("revenue"), body))
}

#[utoipa::path(
    get,
    path = "/api/reports/inventory",
    responses(
        (status = 200, description = "Stock valuation by product and category", body = InventoryReport)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn inventory_report(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success_response(state.services.reports.inventory().await?))
}

#[utoipa::path(
    get,
    path = "/api/reports/inventory/export",
    responses(
        (status = 200, description = "Inventory report as CSV", content_type = "text/csv", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn export_inventory(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.services.reports.inventory_csv().await?;
    Ok(csv_response(&export_name("inventory"), body))
}

#[utoipa::path(
    get,
    path = "/api/reports/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Filtered ledger with total amount", body = TransactionReport),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn transaction_report(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let report = state
        .services
        .reports
        .transactions(&query.into_filter()?)
        .await?;
    Ok(success_response(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/transactions/export",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Filtered ledger as CSV", content_type = "text/csv", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn export_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let body = state
        .services
        .reports
        .transactions_csv(&query.into_filter()?)
        .await?;
    Ok(csv_response(&export_name("transactions"), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn revenue_query_requires_both_dates() {
        let query = RevenueQuery {
            start_date: Some("2024-10-01".to_string()),
            ..Default::default()
        };
        assert_matches!(query.bounds(), Err(ApiError::BadRequest(msg)) if msg.contains("endDate"));
    }

    #[test]
    fn revenue_query_defaults_to_daily_buckets() {
        let uri: axum::http::Uri = "/api/reports/revenue?startDate=2024-10-01&endDate=2024-10-31"
            .parse()
            .unwrap();
        let Query(query) = Query::<RevenueQuery>::try_from_uri(&uri).unwrap();
        let (start, end, group_by) = query.bounds().unwrap();
        assert_eq!(group_by, GroupBy::Day);
        assert!(start < end);
    }

    #[test]
    fn group_by_parses_lowercase() {
        let uri: axum::http::Uri =
            "/api/reports/revenue?startDate=2024-01-01&endDate=2024-12-31&groupBy=month"
                .parse()
                .unwrap();
        let Query(query) = Query::<RevenueQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.group_by, Some(GroupBy::Month));
    }
}
