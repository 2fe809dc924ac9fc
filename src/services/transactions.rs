//! Stock ledger
//!
//! Every stock movement is recorded as an immutable [`transaction::Model`] and
//! applied to `products.quantity` inside the same database transaction. The
//! quantity write is a single conditional `UPDATE`, so concurrent exports can
//! never drive stock below zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult,
    JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set, TransactionError,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money;
use crate::db::DbPool;
use crate::entities::{product, transaction, user, ProductStatus, QuantitySource, TransactionType};
use crate::errors::ServiceError;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Effect of a write on `products.quantity`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    Increase(i32),
    Decrease(i32),
    Set(i32),
}

impl StockChange {
    pub fn for_transaction(transaction_type: TransactionType, quantity: i32) -> Self {
        match transaction_type {
            TransactionType::Import => StockChange::Increase(quantity),
            TransactionType::Export => StockChange::Decrease(quantity),
            TransactionType::Adjustment => StockChange::Set(quantity),
        }
    }

    pub fn amount(self) -> i32 {
        match self {
            StockChange::Increase(q) | StockChange::Decrease(q) | StockChange::Set(q) => q,
        }
    }

}

/// Writes a quantity change to a product and keeps its status in step.
///
/// This is the only code path that mutates `products.quantity` after creation;
/// both the ledger and the manual override endpoint go through it. Must be
/// called on a connection inside an open database transaction.
pub(crate) async fn apply_stock_change<C>(
    conn: &C,
    product_id: Uuid,
    change: StockChange,
    actor: Uuid,
    source: QuantitySource,
) -> Result<product::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let quantity_expr: SimpleExpr = match change {
        StockChange::Increase(q) => Expr::col(product::Column::Quantity).add(q),
        StockChange::Decrease(q) => Expr::col(product::Column::Quantity).sub(q),
        StockChange::Set(q) => Expr::value(q).into(),
    };

    let mut update = product::Entity::update_many()
        .col_expr(product::Column::Quantity, quantity_expr)
        .col_expr(product::Column::QuantitySource, Expr::value(source.to_value()))
        .col_expr(product::Column::UpdatedBy, Expr::value(Some(actor)))
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id));

    match change {
        StockChange::Decrease(q) => update = update.filter(product::Column::Quantity.gte(q)),
        StockChange::Increase(q) => {
            update = update.filter(product::Column::Quantity.lte(i32::MAX - q))
        }
        StockChange::Set(_) => {}
    }

    let result = update.exec(conn).await.map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let current = product::Entity::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        // Only a guarded change can miss an existing row
        return Err(match change {
            StockChange::Increase(q) => ServiceError::ValidationError(format!(
                "product {} has {} units, adding {} exceeds the maximum of {}",
                current.sku,
                current.quantity,
                q,
                i32::MAX
            )),
            _ => ServiceError::InsufficientStock(format!(
                "product {} has {} units, {} requested",
                current.sku,
                current.quantity,
                change.amount()
            )),
        });
    }

    let mut updated = product::Entity::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let next_status = updated.status.for_quantity(updated.quantity);
    if next_status != updated.status {
        product::Entity::update_many()
            .col_expr(product::Column::Status, Expr::value(next_status.to_value()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        updated.status = next_status;
    }

    Ok(updated)
}

/// Maps a sea-orm transaction error back onto the service error it carried.
pub(crate) fn flatten_txn_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// Generates a reference like `SO-202410-0042`.
pub fn generate_reference_number(transaction_type: TransactionType, at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}-{}-{:04}",
        transaction_type.reference_prefix(),
        at.format("%Y%m"),
        suffix
    )
}

/// Validated input for a new ledger entry
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }
        if self.quantity == 0 && self.transaction_type != TransactionType::Adjustment {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be greater than zero for {}",
                self.transaction_type
            )));
        }
        money::validate_amount("price_per_unit", self.price_per_unit)?;
        self.total_amount().map(|_| ())
    }

    pub fn total_amount(&self) -> Result<Decimal, ServiceError> {
        money::line_total(self.quantity, self.price_per_unit)
    }
}

/// Outcome of a committed ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordedTransaction {
    #[serde(rename = "transactionId")]
    pub transaction_id: Uuid,
    pub transaction: transaction::Model,
    /// Product quantity after the movement
    pub product_quantity: i32,
    pub product_status: ProductStatus,
}

/// Ledger entry joined with product and performer details
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Uuid,
    pub performed_by_username: String,
    pub transaction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub transaction_type: Option<TransactionType>,
    pub product_id: Option<Uuid>,
    pub performed_by: Option<Uuid>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Per-type aggregate for one product
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementRow {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub transaction_count: i64,
    pub total_quantity: i64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionSummary {
    pub total_transactions: i64,
    pub import_count: i64,
    pub export_count: i64,
    pub adjustment_count: i64,
    pub total_import_amount: Decimal,
    pub total_export_amount: Decimal,
    /// Export total minus import total
    pub profit: Decimal,
}

impl TransactionSummary {
    fn from_groups(groups: &[MovementRow]) -> Result<Self, ServiceError> {
        let mut summary = TransactionSummary::default();
        for group in groups {
            summary.total_transactions += group.transaction_count;
            match group.transaction_type {
                TransactionType::Import => {
                    summary.import_count += group.transaction_count;
                    summary.total_import_amount =
                        money::checked_add(summary.total_import_amount, group.total_amount)?;
                }
                TransactionType::Export => {
                    summary.export_count += group.transaction_count;
                    summary.total_export_amount =
                        money::checked_add(summary.total_export_amount, group.total_amount)?;
                }
                TransactionType::Adjustment => {
                    summary.adjustment_count += group.transaction_count;
                }
            }
        }
        summary.profit =
            money::checked_sub(summary.total_export_amount, summary.total_import_amount)?;
        Ok(summary)
    }
}

/// Service for recording and querying stock movements
#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DbPool>,
}

impl TransactionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Records a movement and applies it to the product's stock atomically.
    ///
    /// On any failure neither the ledger row nor the quantity change is kept.
    #[instrument(skip(self, input), fields(product_id = %input.product_id, kind = %input.transaction_type))]
    pub async fn create(
        &self,
        performed_by: Uuid,
        input: NewTransaction,
    ) -> Result<RecordedTransaction, ServiceError> {
        input.validate()?;
        let total_amount = input.total_amount()?;

        let kind = input.transaction_type;
        let now = Utc::now();
        let reference_number = input
            .reference_number
            .clone()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| generate_reference_number(kind, now));

        let result = self
            .db
            .transaction::<_, RecordedTransaction, ServiceError>(move |txn| {
                Box::pin(async move {
                    let change = StockChange::for_transaction(kind, input.quantity);
                    let updated = apply_stock_change(
                        txn,
                        input.product_id,
                        change,
                        performed_by,
                        QuantitySource::Ledger,
                    )
                    .await?;

                    let entry = transaction::ActiveModel {
                        transaction_type: Set(kind),
                        product_id: Set(input.product_id),
                        quantity: Set(input.quantity),
                        price_per_unit: Set(input.price_per_unit),
                        total_amount: Set(total_amount),
                        reference_number: Set(Some(reference_number)),
                        notes: Set(input.notes.clone()),
                        performed_by: Set(performed_by),
                        transaction_date: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    Ok(RecordedTransaction {
                        transaction_id: entry.id,
                        transaction: entry,
                        product_quantity: updated.quantity,
                        product_status: updated.status,
                    })
                })
            })
            .await
            .map_err(flatten_txn_error);

        match &result {
            Ok(recorded) => {
                counter!("inventory.transactions.created", 1, "type" => kind.to_string());
                info!(
                    transaction_id = %recorded.transaction_id,
                    quantity = recorded.transaction.quantity,
                    new_quantity = recorded.product_quantity,
                    "Ledger entry recorded"
                );
            }
            Err(ServiceError::InsufficientStock(reason)) => {
                counter!("inventory.transactions.rejected", 1, "type" => kind.to_string());
                warn!(reason = %reason, "Export rejected");
            }
            Err(_) => {
                counter!("inventory.transactions.rejected", 1, "type" => kind.to_string());
            }
        }

        result
    }

    fn joined_query() -> Select<transaction::Entity> {
        transaction::Entity::find()
            .select_only()
            .columns([
                transaction::Column::Id,
                transaction::Column::TransactionType,
                transaction::Column::ProductId,
                transaction::Column::Quantity,
                transaction::Column::PricePerUnit,
                transaction::Column::TotalAmount,
                transaction::Column::ReferenceNumber,
                transaction::Column::Notes,
                transaction::Column::PerformedBy,
                transaction::Column::TransactionDate,
            ])
            .column_as(product::Column::Name, "product_name")
            .column_as(product::Column::Sku, "product_sku")
            .column_as(user::Column::Username, "performed_by_username")
            .join(JoinType::InnerJoin, transaction::Relation::Product.def())
            .join(JoinType::InnerJoin, transaction::Relation::PerformedBy.def())
    }

    fn apply_filter(
        mut query: Select<transaction::Entity>,
        filter: &TransactionFilter,
    ) -> Select<transaction::Entity> {
        if let Some(start) = filter.start_date {
            query = query.filter(transaction::Column::TransactionDate.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(transaction::Column::TransactionDate.lte(end));
        }
        if let Some(kind) = filter.transaction_type {
            query = query.filter(transaction::Column::TransactionType.eq(kind));
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(transaction::Column::ProductId.eq(product_id));
        }
        if let Some(user_id) = filter.performed_by {
            query = query.filter(transaction::Column::PerformedBy.eq(user_id));
        }
        query
    }

    /// Lists ledger entries, most recent first.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: &TransactionFilter) -> Result<Vec<TransactionView>, ServiceError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        Self::apply_filter(Self::joined_query(), filter)
            .order_by_desc(transaction::Column::TransactionDate)
            .limit(limit)
            .offset(filter.offset.unwrap_or(0))
            .into_model::<TransactionView>()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<TransactionView, ServiceError> {
        Self::joined_query()
            .filter(transaction::Column::Id.eq(id))
            .into_model::<TransactionView>()
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))
    }

    async fn grouped_totals(
        &self,
        product_id: Option<Uuid>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<MovementRow>, ServiceError> {
        let filter = TransactionFilter {
            start_date: start,
            end_date: end,
            product_id,
            ..Default::default()
        };

        let rows: Vec<(TransactionType, i64, Option<i64>, Option<Decimal>)> =
            Self::apply_filter(transaction::Entity::find().select_only(), &filter)
                .column(transaction::Column::TransactionType)
                .column_as(transaction::Column::Id.count(), "transaction_count")
                .column_as(transaction::Column::Quantity.sum(), "total_quantity")
                .column_as(transaction::Column::TotalAmount.sum(), "total_amount")
                .group_by(transaction::Column::TransactionType)
                .into_tuple()
                .all(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;

        // BTreeMap keeps the output ordered by type
        let grouped: BTreeMap<TransactionType, MovementRow> = rows
            .into_iter()
            .map(|(kind, count, quantity, amount)| {
                (
                    kind,
                    MovementRow {
                        transaction_type: kind,
                        transaction_count: count,
                        total_quantity: quantity.unwrap_or(0),
                        total_amount: amount.unwrap_or(Decimal::ZERO),
                    },
                )
            })
            .collect();

        Ok(grouped.into_values().collect())
    }

    /// Per-type totals for one product. Types with no entries in the window are absent.
    #[instrument(skip(self))]
    pub async fn product_movement(
        &self,
        product_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<MovementRow>, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        self.grouped_totals(Some(product_id), start, end).await
    }

    #[instrument(skip(self))]
    pub async fn summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<TransactionSummary, ServiceError> {
        let groups = self.grouped_totals(None, start, end).await?;
        TransactionSummary::from_groups(&groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(TransactionType::Import, StockChange::Increase(50))]
    #[case(TransactionType::Export, StockChange::Decrease(3))]
    #[case(TransactionType::Adjustment, StockChange::Set(0))]
    fn movement_maps_to_stock_change(#[case] kind: TransactionType, #[case] change: StockChange) {
        assert_eq!(StockChange::for_transaction(kind, change.amount()), change);
    }

    #[test]
    fn reference_numbers_follow_type_prefix() {
        let at = DateTime::parse_from_rfc3339("2024-10-05T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let po = generate_reference_number(TransactionType::Import, at);
        assert!(po.starts_with("PO-202410-"), "{po}");
        assert_eq!(po.len(), "PO-202410-0000".len());

        assert!(generate_reference_number(TransactionType::Export, at).starts_with("SO-202410-"));
        assert!(generate_reference_number(TransactionType::Adjustment, at).starts_with("ADJ-202410-"));
    }

    fn input(kind: TransactionType, quantity: i32, price: Decimal) -> NewTransaction {
        NewTransaction {
            transaction_type: kind,
            product_id: Uuid::new_v4(),
            quantity,
            price_per_unit: price,
            reference_number: None,
            notes: None,
        }
    }

    #[test]
    fn quantity_rules() {
        assert!(input(TransactionType::Adjustment, 0, dec!(0)).validate().is_ok());
        assert!(input(TransactionType::Import, 0, dec!(1)).validate().is_err());
        assert!(input(TransactionType::Export, 0, dec!(1)).validate().is_err());
        assert!(input(TransactionType::Adjustment, -1, dec!(1)).validate().is_err());
        assert!(input(TransactionType::Import, 1, dec!(-0.01)).validate().is_err());
        assert!(input(TransactionType::Import, 1, dec!(0.005)).validate().is_err());
        assert!(input(TransactionType::Import, 2, Decimal::MAX).validate().is_err());
        // Each factor fits, the product does not
        assert!(input(TransactionType::Import, 1_000_000, dec!(99999999.99)).validate().is_err());
    }

    #[test]
    fn total_is_quantity_times_price() {
        assert_eq!(
            input(TransactionType::Export, 3, dec!(150000)).total_amount().unwrap(),
            dec!(450000)
        );
        assert_eq!(
            input(TransactionType::Import, 50, dec!(80000)).total_amount().unwrap(),
            dec!(4000000)
        );
    }

    #[test]
    fn summary_derives_profit_from_groups() {
        let groups = vec![
            MovementRow {
                transaction_type: TransactionType::Import,
                transaction_count: 2,
                total_quantity: 60,
                total_amount: dec!(4800000),
            },
            MovementRow {
                transaction_type: TransactionType::Export,
                transaction_count: 3,
                total_quantity: 12,
                total_amount: dec!(1800000),
            },
            MovementRow {
                transaction_type: TransactionType::Adjustment,
                transaction_count: 1,
                total_quantity: 0,
                total_amount: dec!(0),
            },
        ];

        let summary = TransactionSummary::from_groups(&groups).unwrap();
        assert_eq!(summary.total_transactions, 6);
        assert_eq!(summary.export_count, 3);
        assert_eq!(summary.profit, dec!(-3000000));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn total_recomputes_from_parts(q in 0i32..100_000, cents in 0i64..100_000_000) {
                let price = Decimal::new(cents, 2);
                let entry = input(TransactionType::Import, q.max(1), price);
                prop_assert_eq!(entry.total_amount().unwrap() / Decimal::from(q.max(1)), price);
            }
        }
    }
}
