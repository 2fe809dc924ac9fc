use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::Response,
    routing::{get, patch, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{created_response, csv_response, message_response, success_response, ListPayload};
use crate::{
    auth::{AuthRouterExt, AuthUser},
    entities::{product, ProductStatus, UserRole},
    errors::ApiError,
    services::products::{ImportReport, NewProduct, ProductFilter, ProductSort, ProductUpdate, ProductView},
    AppState,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Opening stock, defaults to 0
    pub quantity: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub cost_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub selling_price: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
}

impl CreateProductRequest {
    fn into_new_product(self) -> Result<NewProduct, ApiError> {
        let missing = |field: &str| ApiError::BadRequest(format!("{} is required", field));
        Ok(NewProduct {
            name: self.name.ok_or_else(|| missing("name"))?,
            sku: self.sku.ok_or_else(|| missing("sku"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            size: self.size.ok_or_else(|| missing("size"))?,
            color: self.color.ok_or_else(|| missing("color"))?,
            quantity: self.quantity.unwrap_or(0),
            cost_price: self.cost_price.ok_or_else(|| missing("cost_price"))?,
            selling_price: self.selling_price.ok_or_else(|| missing("selling_price"))?,
            supplier_id: self.supplier_id,
            description: self.description,
            image_url: self.image_url,
            status: self.status,
        })
    }
}

/// Stock and SKU are rejected here: stock moves through the ledger or the
/// quantity override, and the SKU is the product's permanent business key.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    #[schema(value_type = Option<String>)]
    pub cost_price: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub selling_price: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
    #[schema(value_type = Option<Object>)]
    pub quantity: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub sku: Option<serde_json::Value>,
}

impl UpdateProductRequest {
    fn into_update(self) -> Result<ProductUpdate, ApiError> {
        if self.quantity.is_some() {
            return Err(ApiError::BadRequest(
                "quantity cannot be edited here; record a transaction or use PATCH /api/products/{id}/quantity".to_string(),
            ));
        }
        if self.sku.is_some() {
            return Err(ApiError::BadRequest("sku cannot be changed".to_string()));
        }
        Ok(ProductUpdate {
            name: self.name,
            category: self.category,
            size: self.size,
            color: self.color,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            supplier_id: self.supplier_id,
            description: self.description,
            image_url: self.image_url,
            status: self.status,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuantityOverrideRequest {
    pub quantity: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
    pub supplier_id: Option<Uuid>,
    /// name, sku, quantity, selling_price or created_at
    pub sort: Option<String>,
    /// asc or desc
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, ApiError> {
        let sort = self
            .sort
            .as_deref()
            .map(ProductSort::from_str)
            .transpose()
            .map_err(|_| ApiError::BadRequest("unsupported sort column".to_string()))?
            .unwrap_or_default();

        let descending = match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "order must be asc or desc, got {}",
                    other
                )))
            }
        };

        Ok(ProductFilter {
            category: self.category,
            status: self.status,
            supplier_id: self.supplier_id,
            sort,
            descending,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct KeywordQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<ProductView>,
    pub count: usize,
}

/// Catalogue routes: reads for any signed-in user, writes for managers, deletes for admins.
pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/", get(list_products))
        .route("/search", get(search_products))
        .route("/export", get(export_products))
        .route("/:id", get(get_product))
        .with_role(UserRole::User);

    let write = Router::new()
        .route("/", post(create_product))
        .route("/import", post(import_products))
        .route("/:id", put(update_product))
        .route("/:id/quantity", patch(override_quantity))
        .with_role(UserRole::Manager);

    let admin = Router::new()
        .route("/:id", axum::routing::delete(delete_product))
        .with_role(UserRole::Admin);

    read.merge(write).merge(admin)
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductQuery),
    responses(
        (status = 200, description = "Products with supplier name", body = ProductList),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let items = state.services.products.list(&query.into_filter()?).await?;
    Ok(success_response(ListPayload::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/products/search",
    params(KeywordQuery),
    responses(
        (status = 200, description = "Products matching name, SKU or category", body = ProductList),
        (status = 400, description = "Missing keyword", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    query: Result<Query<KeywordQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let keyword = query
        .keyword
        .ok_or_else(|| ApiError::BadRequest("keyword is required".to_string()))?;
    let items = state.services.products.search(&keyword).await?;
    Ok(success_response(ListPayload::from(items)))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ProductView),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.products.get(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = product::Model),
        (status = 400, description = "Invalid input or duplicate SKU", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let created = state
        .services
        .products
        .create(user.user_id, payload.into_new_product()?)
        .await?;
    Ok(created_response(created))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = product::Model),
        (status = 400, description = "Invalid input, or quantity/sku supplied", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let updated = state
        .services
        .products
        .update(user.user_id, id, payload.into_update()?)
        .await?;
    Ok(success_response(updated))
}

/// Manual stock override outside the ledger
#[utoipa::path(
    patch,
    path = "/api/products/{id}/quantity",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = QuantityOverrideRequest,
    responses(
        (status = 200, description = "Quantity set; provenance recorded as manual_override", body = product::Model),
        (status = 400, description = "Missing or negative quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn override_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<QuantityOverrideRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let quantity = payload
        .quantity
        .ok_or_else(|| ApiError::BadRequest("quantity is required".to_string()))?;

    let updated = state
        .services
        .products
        .set_quantity(user.user_id, id, quantity, payload.reason)
        .await?;
    Ok(success_response(updated))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product has ledger history", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.services.products.delete(id).await?;
    Ok(message_response(
        serde_json::json!({ "id": id }),
        "Product deleted",
    ))
}

#[utoipa::path(
    get,
    path = "/api/products/export",
    responses(
        (status = 200, description = "Catalogue as CSV", content_type = "text/csv", body = String)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn export_products(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.services.products.export_csv().await?;
    Ok(csv_response("products.csv", body))
}

/// Bulk create/update from a CSV body
#[utoipa::path(
    post,
    path = "/api/products/import",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Per-row outcome", body = ImportReport),
        (status = 400, description = "Unreadable CSV or missing sku column", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "products"
)]
pub async fn import_products(
    State(state): State<AppState>,
    user: AuthUser,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("CSV body is empty".to_string()));
    }
    let report = state.services.products.import_csv(user.user_id, &body).await?;
    Ok(success_response(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_rejects_quantity_and_sku() {
        let with_quantity: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({ "name": "Runner", "quantity": 99 })).unwrap();
        assert!(with_quantity.into_update().is_err());

        let with_sku: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({ "sku": "NEW-1" })).unwrap();
        assert!(with_sku.into_update().is_err());

        let plain: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({ "selling_price": "990000" })).unwrap();
        assert!(plain.into_update().is_ok());
    }

    #[test]
    fn query_sort_and_order() {
        let filter = ProductQuery {
            sort: Some("quantity".into()),
            order: Some("DESC".into()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.sort, ProductSort::Quantity);
        assert!(filter.descending);

        assert!(ProductQuery {
            order: Some("sideways".into()),
            ..Default::default()
        }
        .into_filter()
        .is_err());
    }
}
