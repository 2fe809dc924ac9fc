use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    middleware,
    response::Response,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{created_response, parse_optional_date, success_response, Bound, ListPayload};
use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::TransactionType,
    errors::ApiError,
    middleware_helpers::{idempotency_middleware, IdempotencyStore},
    services::transactions::{
        MovementRow, NewTransaction, RecordedTransaction, TransactionFilter, TransactionSummary,
        TransactionView,
    },
    AppState,
};

/// Body for `POST /api/transactions`. Fields are optional so that a missing
/// field is reported as a validation error rather than a decode failure.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    #[serde(alias = "productId")]
    pub product_id: Option<Uuid>,
    pub quantity: Option<i64>,
    #[serde(alias = "pricePerUnit")]
    #[schema(value_type = Option<String>, example = "150000")]
    pub price_per_unit: Option<Decimal>,
    #[serde(alias = "referenceNumber")]
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl CreateTransactionRequest {
    pub fn into_new_transaction(self) -> Result<NewTransaction, ApiError> {
        let missing = |field: &str| ApiError::BadRequest(format!("{} is required", field));

        let transaction_type = self.transaction_type.ok_or_else(|| missing("type"))?;
        let product_id = self.product_id.ok_or_else(|| missing("product_id"))?;
        let quantity = self.quantity.ok_or_else(|| missing("quantity"))?;
        let price_per_unit = self.price_per_unit.ok_or_else(|| missing("price_per_unit"))?;

        let quantity = i32::try_from(quantity)
            .map_err(|_| ApiError::BadRequest("quantity is out of range".to_string()))?;

        Ok(NewTransaction {
            transaction_type,
            product_id,
            quantity,
            price_per_unit,
            reference_number: self.reference_number,
            notes: self.notes,
        })
    }
}

/// Ledger filters. Dates accept RFC 3339 or `YYYY-MM-DD`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    /// A bare date includes the whole day
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    #[serde(rename = "productId", alias = "product_id")]
    pub product_id: Option<Uuid>,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<Uuid>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl TransactionQuery {
    pub fn into_filter(self) -> Result<TransactionFilter, ApiError> {
        Ok(TransactionFilter {
            start_date: parse_optional_date("startDate", self.start_date.as_deref(), Bound::Start)?,
            end_date: parse_optional_date("endDate", self.end_date.as_deref(), Bound::End)?,
            transaction_type: self.transaction_type,
            product_id: self.product_id,
            performed_by: self.user_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MovementQuery {
    #[serde(rename = "productId", alias = "product_id")]
    pub product_id: Option<Uuid>,
    #[serde(rename = "startDate", alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", alias = "end_date")]
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionList {
    pub items: Vec<TransactionView>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductMovement {
    pub product_id: Uuid,
    pub movements: Vec<MovementRow>,
}

/// Ledger routes; every route needs a signed-in user. Only POST is de-duplicated.
pub fn routes(idempotency: IdempotencyStore) -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/summary", get(transaction_summary))
        .route("/product/movement", get(product_movement))
        .route("/:id", get(get_transaction))
        .route_layer(middleware::from_fn_with_state(
            idempotency,
            idempotency_middleware,
        ))
        .with_auth()
}

/// Record a stock movement
#[utoipa::path(
    post,
    path = "/api/transactions",
    request_body = CreateTransactionRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Replays the first response for repeats by the same user")
    ),
    responses(
        (status = 201, description = "Transaction recorded and stock updated", body = RecordedTransaction),
        (status = 400, description = "Missing fields or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Same Idempotency-Key still in flight", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let input = payload.into_new_transaction()?;

    let recorded = state
        .services
        .transactions
        .create(user.user_id, input)
        .await?;

    Ok(created_response(recorded))
}

/// List ledger entries, newest first
#[utoipa::path(
    get,
    path = "/api/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Ledger entries", body = TransactionList),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let items = state
        .services
        .transactions
        .list(&query.into_filter()?)
        .await?;

    Ok(success_response(ListPayload::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Ledger entry with product and performer", body = TransactionView),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let view = state.services.transactions.get_by_id(id).await?;
    Ok(success_response(view))
}

/// Per-type totals for one product
#[utoipa::path(
    get,
    path = "/api/transactions/product/movement",
    params(MovementQuery),
    responses(
        (status = 200, description = "One row per type present in the window", body = ProductMovement),
        (status = 400, description = "Missing productId or bad date", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn product_movement(
    State(state): State<AppState>,
    query: Result<Query<MovementQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let product_id = query
        .product_id
        .ok_or_else(|| ApiError::BadRequest("productId is required".to_string()))?;
    let start = parse_optional_date("startDate", query.start_date.as_deref(), Bound::Start)?;
    let end = parse_optional_date("endDate", query.end_date.as_deref(), Bound::End)?;

    let movements = state
        .services
        .transactions
        .product_movement(product_id, start, end)
        .await?;

    Ok(success_response(ProductMovement {
        product_id,
        movements,
    }))
}

#[utoipa::path(
    get,
    path = "/api/transactions/summary",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Counts, import/export totals and profit", body = TransactionSummary),
        (status = 400, description = "Bad date", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn transaction_summary(
    State(state): State<AppState>,
    query: Result<Query<DateRangeQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let start = parse_optional_date("startDate", query.start_date.as_deref(), Bound::Start)?;
    let end = parse_optional_date("endDate", query.end_date.as_deref(), Bound::End)?;

    let summary = state.services.transactions.summary(start, end).await?;
    Ok(success_response(summary))
}
