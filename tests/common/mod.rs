#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde_json::{json, Value};
use shoe_inventory_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{product, supplier, transaction, user, TransactionType, UserRole, UserStatus},
    services::{products::NewProduct, suppliers::SupplierInput},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_inventory_tests_0123456789";

/// A seeded account and a bearer token for it.
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub token: String,
}

/// Full application over a throwaway SQLite file, with one account per role.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: TestUser,
    pub manager: TestUser,
    pub user: TestUser,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        // SQLite allows one writer; a single connection keeps tests deterministic
        Self::with_pool_size(1).await
    }

    /// Same app over a WAL-mode database shared by `connections` pooled connections,
    /// so concurrent requests run in overlapping database transactions.
    pub async fn with_pool_size(connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("inventory.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        {
            // Journal mode is stored in the file, so set it before the pool opens
            let setup = Database::connect(url.as_str())
                .await
                .expect("open test database");
            setup
                .execute_unprepared("PRAGMA journal_mode=WAL")
                .await
                .expect("enable WAL");
            db::run_migrations(&setup)
                .await
                .expect("failed to run migrations in tests");
            setup.close().await.expect("close setup connection");
        }

        let mut cfg = AppConfig::new(
            url,
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let state = AppState::new(Arc::new(pool), cfg);

        let admin = seed_user(&state, "admin", UserRole::Admin).await;
        let manager = seed_user(&state, "manager", UserRole::Manager).await;
        let user = seed_user(&state, "staff", UserRole::User).await;

        Self {
            router: app_router(state.clone()),
            state,
            admin,
            manager,
            user,
            _dir: dir,
        }
    }

    /// Send a JSON request with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("build request")).await
    }

    /// Send a raw body, e.g. CSV or malformed JSON.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        content_type: &str,
        body: impl Into<Body>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", content_type);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        self.send(builder.body(body.into()).expect("build request"))
            .await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request and decode the JSON body in one step.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None, Some(token)).await
    }

    /// Posts a ledger entry as `token`'s user.
    pub async fn record(
        &self,
        token: &str,
        kind: TransactionType,
        product_id: Uuid,
        quantity: i64,
        price_per_unit: &str,
    ) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/transactions",
            Some(json!({
                "type": kind.to_string(),
                "product_id": product_id,
                "quantity": quantity,
                "price_per_unit": price_per_unit,
            })),
            Some(token),
        )
        .await
    }

    pub async fn create_supplier(&self, name: &str) -> supplier::Model {
        self.state
            .services
            .suppliers
            .create(
                self.admin.id,
                SupplierInput {
                    name: name.to_string(),
                    contact_person: Some("Tran Thi Binh".to_string()),
                    email: Some(format!("{}@suppliers.test", name.to_lowercase().replace(' ', "-"))),
                    phone: "0281234567".to_string(),
                    address: None,
                    tax_code: None,
                    status: None,
                },
            )
            .await
            .expect("seed supplier")
    }

    pub async fn create_product(&self, sku: &str, quantity: i32, cost: &str) -> product::Model {
        self.create_product_with(sku, "Running", quantity, cost, None)
            .await
    }

    pub async fn create_product_with(
        &self,
        sku: &str,
        category: &str,
        quantity: i32,
        cost: &str,
        supplier_id: Option<Uuid>,
    ) -> product::Model {
        let cost = Decimal::from_str(cost).expect("cost literal");
        self.state
            .services
            .products
            .create(
                self.admin.id,
                NewProduct {
                    name: format!("Shoe {}", sku),
                    sku: sku.to_string(),
                    category: category.to_string(),
                    size: "42".to_string(),
                    color: "Black".to_string(),
                    quantity,
                    cost_price: cost,
                    selling_price: cost * Decimal::new(15, 1),
                    supplier_id,
                    description: None,
                    image_url: None,
                    status: None,
                },
            )
            .await
            .expect("seed product")
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn ledger_count(&self, product_id: Uuid) -> u64 {
        transaction::Entity::find()
            .filter(transaction::Column::ProductId.eq(product_id))
            .count(self.state.db.as_ref())
            .await
            .expect("count ledger entries")
    }

    /// Inserts an extra account directly, returning it with a fresh token.
    pub async fn add_user(&self, username: &str, role: UserRole) -> TestUser {
        seed_user(&self.state, username, role).await
    }
}

async fn seed_user(state: &AppState, username: &str, role: UserRole) -> TestUser {
    let password = format!("{}-pass", username);

    let model = user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(quick_hash(&password)),
        full_name: Set(format!("{} account", username)),
        email: Set(format!("{}@shoestore.test", username)),
        phone: Set(None),
        role: Set(role),
        status: Set(UserStatus::Active),
        ..Default::default()
    }
    .insert(state.db.as_ref())
    .await
    .expect("insert test user");

    let token = state
        .services
        .auth
        .generate_token(&model)
        .expect("issue test token")
        .token;

    TestUser {
        id: model.id,
        username: model.username,
        password,
        token,
    }
}

/// Argon2id with minimal cost; verification reads parameters from the hash.
fn quick_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).expect("argon2 params");
    let salt = SaltString::encode_b64(b"inventory-tests!").expect("salt");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .expect("hash test password")
        .to_string()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Decimals serialize as strings; compare them numerically.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

pub fn dec_str(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}
