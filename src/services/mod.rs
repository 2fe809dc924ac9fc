// Account and user management
pub mod accounts;
pub mod users;

// Catalogue
pub mod products;
pub mod suppliers;

// Stock ledger and reporting
pub mod money;
pub mod reports;
pub mod transactions;
