use std::sync::Arc;

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::DbPool,
    middleware_helpers::IdempotencyStore,
    services::{
        accounts::AccountService, products::ProductService, reports::ReportService,
        suppliers::SupplierService, transactions::TransactionService, users::UserService,
    },
};

pub mod auth;
pub mod common;
pub mod products;
pub mod reports;
pub mod suppliers;
pub mod transactions;
pub mod users;

pub use crate::AppState;

/// Services shared by every handler. Built once at startup around the injected pool.
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub accounts: Arc<AccountService>,
    pub users: Arc<UserService>,
    pub suppliers: Arc<SupplierService>,
    pub products: Arc<ProductService>,
    pub transactions: Arc<TransactionService>,
    pub reports: Arc<ReportService>,
    pub idempotency: IdempotencyStore,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(config), db_pool.clone()));
        let users = Arc::new(UserService::new(db_pool.clone()));
        let accounts = Arc::new(AccountService::new(users.clone(), auth.clone()));
        let suppliers = Arc::new(SupplierService::new(db_pool.clone()));
        let products = Arc::new(ProductService::new(db_pool.clone()));
        let transactions = Arc::new(TransactionService::new(db_pool.clone()));
        let reports = Arc::new(ReportService::new(
            db_pool,
            transactions.clone(),
            config.low_stock_threshold,
        ));

        Self {
            auth,
            accounts,
            users,
            suppliers,
            products,
            transactions,
            reports,
            idempotency: IdempotencyStore::new(config.idempotency_ttl()),
        }
    }
}
