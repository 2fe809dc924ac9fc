use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{created_response, message_response, success_response, ListPayload};
use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::{supplier, SupplierStatus, UserRole},
    errors::ApiError,
    services::suppliers::{SupplierDetail, SupplierInput, SupplierUpdate},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierQuery {
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierSearchQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SupplierList {
    pub items: Vec<supplier::Model>,
    pub count: usize,
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/", get(list_suppliers))
        .route("/search", get(search_suppliers))
        .route("/:id", get(get_supplier))
        .with_role(UserRole::User);

    let write = Router::new()
        .route("/", post(create_supplier))
        .route("/:id", put(update_supplier))
        .with_role(UserRole::Manager);

    let admin = Router::new()
        .route("/:id", delete(delete_supplier))
        .with_role(UserRole::Admin);

    read.merge(write).merge(admin)
}

#[utoipa::path(
    get,
    path = "/api/suppliers",
    params(SupplierQuery),
    responses(
        (status = 200, description = "Suppliers ordered by name", body = SupplierList),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    query: Result<Query<SupplierQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let items = state.services.suppliers.list(query.status).await?;
    Ok(success_response(ListPayload::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/suppliers/search",
    params(SupplierSearchQuery),
    responses(
        (status = 200, description = "Suppliers matching name, contact, email or phone", body = SupplierList),
        (status = 400, description = "Missing keyword", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn search_suppliers(
    State(state): State<AppState>,
    query: Result<Query<SupplierSearchQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let keyword = query.keyword.unwrap_or_default();
    let items = state.services.suppliers.search(&keyword).await?;
    Ok(success_response(ListPayload::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 200, description = "Supplier with product count", body = SupplierDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.suppliers.get(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/suppliers",
    request_body = SupplierInput,
    responses(
        (status = 201, description = "Supplier created", body = supplier::Model),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<SupplierInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let created = state.services.suppliers.create(user.user_id, payload).await?;
    Ok(created_response(created))
}

#[utoipa::path(
    put,
    path = "/api/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    request_body = SupplierUpdate,
    responses(
        (status = 200, description = "Supplier updated", body = supplier::Model),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<SupplierUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let updated = state
        .services
        .suppliers
        .update(user.user_id, id, payload)
        .await?;
    Ok(success_response(updated))
}

#[utoipa::path(
    delete,
    path = "/api/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 200, description = "Supplier deleted"),
        (status = 400, description = "Supplier still referenced by products", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "suppliers"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.services.suppliers.delete(id).await?;
    Ok(message_response(
        serde_json::json!({ "id": id }),
        "Supplier deleted",
    ))
}
