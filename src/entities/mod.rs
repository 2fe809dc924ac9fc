//! Database entities
//!
//! `transaction` is the append-only stock ledger; `product.quantity` is only
//! written through `services::ledger`.

pub mod product;
pub mod supplier;
pub mod transaction;
pub mod user;

pub use product::{ProductStatus, QuantitySource};
pub use supplier::SupplierStatus;
pub use transaction::TransactionType;
pub use user::{UserRole, UserStatus};
