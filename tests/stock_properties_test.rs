//! Property-based tests for the stock ledger against a real database.
//!
//! Random movement sequences go through the transaction service; after every
//! step the stored product and the ledger must agree with a running model.

mod common;

use assert_matches::assert_matches;
use common::{dec_str, TestApp};
use proptest::prelude::*;
use shoe_inventory_api::{
    entities::{ProductStatus, TransactionType},
    errors::ServiceError,
    services::transactions::NewTransaction,
};

fn movement_strategy() -> impl Strategy<Value = (TransactionType, i32)> {
    prop_oneof![
        (1i32..20).prop_map(|q| (TransactionType::Import, q)),
        (1i32..20).prop_map(|q| (TransactionType::Export, q)),
        (0i32..20).prop_map(|q| (TransactionType::Adjustment, q)),
    ]
}

fn run<F: std::future::Future<Output = Result<(), TestCaseError>>>(f: F) -> Result<(), TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
        .block_on(f)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn ledger_sequence_matches_model(
        initial in 0i32..10,
        movements in prop::collection::vec(movement_strategy(), 1..12),
    ) {
        run(async move {
            let app = TestApp::new().await;
            let product = app.create_product("PROP-1", initial, "1000").await;
            let service = &app.state.services.transactions;

            let mut expected = initial;
            let mut entries = 0u64;

            for (kind, quantity) in movements {
                let result = service
                    .create(
                        app.manager.id,
                        NewTransaction {
                            transaction_type: kind,
                            product_id: product.id,
                            quantity,
                            price_per_unit: dec_str("1000"),
                            reference_number: None,
                            notes: None,
                        },
                    )
                    .await;

                match kind {
                    TransactionType::Export if quantity > expected => {
                        prop_assert!(
                            matches!(result, Err(ServiceError::InsufficientStock(_))),
                            "export of {} from {} was not rejected",
                            quantity,
                            expected
                        );
                    }
                    _ => {
                        let recorded = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                        expected = match kind {
                            TransactionType::Import => expected + quantity,
                            TransactionType::Export => expected - quantity,
                            TransactionType::Adjustment => quantity,
                        };
                        entries += 1;
                        prop_assert_eq!(recorded.product_quantity, expected);
                    }
                }

                let stored = app.product(product.id).await;
                prop_assert!(stored.quantity >= 0);
                prop_assert_eq!(stored.quantity, expected);
                prop_assert_eq!(app.ledger_count(product.id).await, entries);

                let status = if expected == 0 {
                    ProductStatus::OutOfStock
                } else {
                    ProductStatus::Available
                };
                prop_assert_eq!(stored.status, status);
            }
            Ok(())
        })?;
    }

    #[test]
    fn rejected_export_changes_nothing(stock in 0i32..50, extra in 1i32..50) {
        run(async move {
            let app = TestApp::new().await;
            let product = app.create_product("PROP-2", stock, "1000").await;

            let result = app
                .state
                .services
                .transactions
                .create(
                    app.user.id,
                    NewTransaction {
                        transaction_type: TransactionType::Export,
                        product_id: product.id,
                        quantity: stock + extra,
                        price_per_unit: dec_str("2000"),
                        reference_number: None,
                        notes: None,
                    },
                )
                .await;
            assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

            let stored = app.product(product.id).await;
            prop_assert_eq!(stored.quantity, stock);
            prop_assert_eq!(app.ledger_count(product.id).await, 0);
            Ok(())
        })?;
    }
}
