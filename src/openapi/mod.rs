use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shoe Inventory API",
        version = "0.1.0",
        description = r#"
# Shoe Inventory API

Products, suppliers, users and reporting around an append-only stock ledger.

## Authentication

Every route except `/api/auth/login`, `/api/auth/register` and `/api/status` needs a bearer token:

```
Authorization: Bearer <jwt>
```

## Stock ledger

`POST /api/transactions` records an import, export or adjustment and updates the product
quantity in the same database transaction. An export larger than the stock on hand is
rejected and nothing is written. Send an `Idempotency-Key` header to make retries safe.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock: product SKU-42 has 2 units, 10 requested",
  "request_id": "4f1c...",
  "timestamp": "2024-10-01T00:00:00Z"
}
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Login, registration and session"),
        (name = "users", description = "Account administration"),
        (name = "suppliers", description = "Supplier directory"),
        (name = "products", description = "Catalogue and stock levels"),
        (name = "transactions", description = "Append-only stock ledger"),
        (name = "reports", description = "Manager reporting")
    ),
    paths(
        // Auth
        handlers::auth::login,
        handlers::auth::register,
        handlers::auth::me,
        handlers::auth::change_password,
        handlers::auth::logout,

        // Users
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::set_user_status,
        handlers::users::delete_user,

        // Suppliers
        handlers::suppliers::list_suppliers,
        handlers::suppliers::search_suppliers,
        handlers::suppliers::get_supplier,
        handlers::suppliers::create_supplier,
        handlers::suppliers::update_supplier,
        handlers::suppliers::delete_supplier,

        // Products
        handlers::products::list_products,
        handlers::products::search_products,
        handlers::products::get_product,
        handlers::products::create_product,
        handlers::products::update_product,
        handlers::products::override_quantity,
        handlers::products::delete_product,
        handlers::products::export_products,
        handlers::products::import_products,

        // Transactions
        handlers::transactions::create_transaction,
        handlers::transactions::list_transactions,
        handlers::transactions::get_transaction,
        handlers::transactions::product_movement,
        handlers::transactions::transaction_summary,

        // Reports
        handlers::reports::dashboard,
        handlers::reports::revenue_report,
        handlers::reports::export_revenue,
        handlers::reports::inventory_report,
        handlers::reports::export_inventory,
        handlers::reports::transaction_report,
        handlers::reports::export_transactions,
    ),
    components(
        schemas(
            crate::entities::product::Model,
            crate::entities::supplier::Model,
            crate::entities::transaction::Model,
            crate::entities::ProductStatus,
            crate::entities::QuantitySource,
            crate::entities::SupplierStatus,
            crate::entities::TransactionType,
            crate::entities::UserRole,
            crate::entities::UserStatus,
            crate::auth::IssuedToken,
            crate::services::products::ProductSort,
            crate::services::reports::GroupBy,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_covers_ledger_routes_and_security() {
        let openapi = ApiDoc::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Shoe Inventory API"));
        assert!(json.contains("/api/transactions"));
        assert!(json.contains("/api/transactions/product/movement"));
        assert!(json.contains("/api/reports/dashboard"));
        assert!(json.contains("bearer_auth"));
    }

    #[test]
    fn ledger_has_no_update_or_delete_operations() {
        let openapi = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let item = &openapi["paths"]["/api/transactions/{id}"];
        assert!(item.get("get").is_some());
        assert!(item.get("put").is_none());
        assert!(item.get("delete").is_none());
        assert!(item.get("patch").is_none());
    }
}
