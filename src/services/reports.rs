//! Read-only reporting over products and the stock ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::money;
use super::products::{finish_csv, ProductView};
use super::transactions::{TransactionFilter, TransactionService, TransactionSummary, TransactionView};
use crate::db::DbPool;
use crate::entities::{product, supplier, transaction, ProductStatus, TransactionType};
use crate::errors::ServiceError;

const LOW_STOCK_LIMIT: u64 = 10;
const TOP_SELLING_LIMIT: u64 = 5;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Day,
    Month,
    Year,
}

impl GroupBy {
    pub fn period_key(self, at: DateTime<Utc>) -> String {
        let format = match self {
            GroupBy::Day => "%Y-%m-%d",
            GroupBy::Month => "%Y-%m",
            GroupBy::Year => "%Y",
        };
        at.format(format).to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LowStockProduct {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopSellingProduct {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DailyRevenue {
    pub date: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Dashboard {
    pub days: i64,
    pub summary: TransactionSummary,
    pub product_count: u64,
    pub inventory_value: Decimal,
    pub low_stock_threshold: i32,
    pub low_stock_products: Vec<LowStockProduct>,
    pub top_selling_products: Vec<TopSellingProduct>,
    pub revenue_by_day: Vec<DailyRevenue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RevenuePeriod {
    pub period: String,
    /// Export totals
    pub revenue: Decimal,
    /// Import totals
    pub cost: Decimal,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevenueReport {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub group_by: GroupBy,
    pub periods: Vec<RevenuePeriod>,
    pub total_revenue: Decimal,
    pub total_cost: Decimal,
    pub total_profit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryLine {
    #[serde(flatten)]
    pub product: ProductView,
    pub inventory_value: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CategoryStats {
    pub category: String,
    pub product_count: u64,
    pub total_quantity: i64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryReport {
    pub items: Vec<InventoryLine>,
    pub count: usize,
    pub total_value: Decimal,
    pub categories: Vec<CategoryStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionReport {
    pub items: Vec<TransactionView>,
    pub count: usize,
    pub total_amount: Decimal,
}

/// Buckets ledger amounts into revenue periods. Adjustments carry no money flow.
pub fn bucket_revenue(
    rows: impl IntoIterator<Item = (TransactionType, DateTime<Utc>, Decimal)>,
    group_by: GroupBy,
) -> Result<Vec<RevenuePeriod>, ServiceError> {
    let mut periods: BTreeMap<String, RevenuePeriod> = BTreeMap::new();
    for (kind, at, amount) in rows {
        let key = group_by.period_key(at);
        let period = periods.entry(key.clone()).or_insert_with(|| RevenuePeriod {
            period: key,
            ..Default::default()
        });
        match kind {
            TransactionType::Export => period.revenue = money::checked_add(period.revenue, amount)?,
            TransactionType::Import => period.cost = money::checked_add(period.cost, amount)?,
            TransactionType::Adjustment => {}
        }
    }

    periods
        .into_values()
        .map(|mut p| -> Result<RevenuePeriod, ServiceError> {
            p.profit = money::checked_sub(p.revenue, p.cost)?;
            Ok(p)
        })
        .collect()
}

fn category_stats(lines: &[InventoryLine]) -> Result<Vec<CategoryStats>, ServiceError> {
    let mut stats: BTreeMap<&str, CategoryStats> = BTreeMap::new();
    for line in lines {
        let category = line.product.product.category.as_str();
        let entry = stats.entry(category).or_insert_with(|| CategoryStats {
            category: category.to_string(),
            ..Default::default()
        });
        entry.product_count += 1;
        entry.total_quantity += i64::from(line.product.product.quantity);
        entry.total_value = money::checked_add(entry.total_value, line.inventory_value)?;
    }
    Ok(stats.into_values().collect())
}

/// Service for dashboards and reports
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
    transactions: Arc<TransactionService>,
    low_stock_threshold: i32,
}

impl ReportService {
    pub fn new(db: Arc<DbPool>, transactions: Arc<TransactionService>, low_stock_threshold: i32) -> Self {
        Self {
            db,
            transactions,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, days: i64) -> Result<Dashboard, ServiceError> {
        if !(1..=3650).contains(&days) {
            return Err(ServiceError::BadRequest(
                "days must be between 1 and 3650".to_string(),
            ));
        }
        let since = Utc::now() - Duration::days(days);

        let summary = self.transactions.summary(Some(since), None).await?;

        let product_count = product::Entity::find()
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let stock: Vec<(i32, Decimal)> = product::Entity::find()
            .select_only()
            .column(product::Column::Quantity)
            .column(product::Column::CostPrice)
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let values = stock
            .into_iter()
            .map(|(quantity, cost)| money::checked_mul(quantity, cost))
            .collect::<Result<Vec<_>, _>>()?;
        let inventory_value = money::checked_sum(values)?;

        let low_stock_products = product::Entity::find()
            .filter(product::Column::Quantity.lt(self.low_stock_threshold))
            .filter(product::Column::Status.ne(ProductStatus::Discontinued))
            .order_by_asc(product::Column::Quantity)
            .order_by_asc(product::Column::Name)
            .limit(LOW_STOCK_LIMIT)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|p| LowStockProduct {
                id: p.id,
                sku: p.sku,
                name: p.name,
                quantity: p.quantity,
                status: p.status,
            })
            .collect();

        let top: Vec<(Uuid, String, String, Option<i64>, Option<Decimal>)> =
            transaction::Entity::find()
                .select_only()
                .column(transaction::Column::ProductId)
                .column(product::Column::Name)
                .column(product::Column::Sku)
                .column_as(transaction::Column::Quantity.sum(), "quantity_sold")
                .column_as(transaction::Column::TotalAmount.sum(), "revenue")
                .join(JoinType::InnerJoin, transaction::Relation::Product.def())
                .filter(transaction::Column::TransactionType.eq(TransactionType::Export))
                .filter(transaction::Column::TransactionDate.gte(since))
                .group_by(transaction::Column::ProductId)
                .group_by(product::Column::Name)
                .group_by(product::Column::Sku)
                .order_by_desc(transaction::Column::Quantity.sum())
                .limit(TOP_SELLING_LIMIT)
                .into_tuple()
                .all(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;

        let top_selling_products = top
            .into_iter()
            .map(|(product_id, name, sku, quantity, revenue)| TopSellingProduct {
                product_id,
                name,
                sku,
                quantity_sold: quantity.unwrap_or(0),
                revenue: revenue.unwrap_or(Decimal::ZERO),
            })
            .collect();

        let exports = self
            .ledger_amounts(since, None, Some(TransactionType::Export))
            .await?;
        let revenue_by_day = bucket_revenue(exports, GroupBy::Day)?
            .into_iter()
            .map(|p| DailyRevenue {
                date: p.period,
                revenue: p.revenue,
            })
            .collect();

        Ok(Dashboard {
            days,
            summary,
            product_count,
            inventory_value,
            low_stock_threshold: self.low_stock_threshold,
            low_stock_products,
            top_selling_products,
            revenue_by_day,
        })
    }

    async fn ledger_amounts(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        kind: Option<TransactionType>,
    ) -> Result<Vec<(TransactionType, DateTime<Utc>, Decimal)>, ServiceError> {
        let mut query = transaction::Entity::find()
            .select_only()
            .column(transaction::Column::TransactionType)
            .column(transaction::Column::TransactionDate)
            .column(transaction::Column::TotalAmount)
            .filter(transaction::Column::TransactionDate.gte(start));

        if let Some(end) = end {
            query = query.filter(transaction::Column::TransactionDate.lte(end));
        }
        if let Some(kind) = kind {
            query = query.filter(transaction::Column::TransactionType.eq(kind));
        }

        query
            .order_by_asc(transaction::Column::TransactionDate)
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn revenue(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<RevenueReport, ServiceError> {
        if start > end {
            return Err(ServiceError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }

        let rows = self.ledger_amounts(start, Some(end), None).await?;
        let periods = bucket_revenue(rows, group_by)?;

        let total_revenue = money::checked_sum(periods.iter().map(|p| p.revenue))?;
        let total_cost = money::checked_sum(periods.iter().map(|p| p.cost))?;

        Ok(RevenueReport {
            start_date: start,
            end_date: end,
            group_by,
            periods,
            total_revenue,
            total_cost,
            total_profit: money::checked_sub(total_revenue, total_cost)?,
        })
    }

    #[instrument(skip(self))]
    pub async fn inventory(&self) -> Result<InventoryReport, ServiceError> {
        let rows = product::Entity::find()
            .find_also_related(supplier::Entity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut items: Vec<InventoryLine> = rows
            .into_iter()
            .map(|row| -> Result<InventoryLine, ServiceError> {
                let product = ProductView::from(row);
                let inventory_value = money::checked_mul(
                    product.product.quantity,
                    product.product.cost_price,
                )?;
                Ok(InventoryLine {
                    inventory_value,
                    product,
                })
            })
            .collect::<Result<_, _>>()?;
        items.sort_by(|a, b| {
            b.inventory_value
                .cmp(&a.inventory_value)
                .then_with(|| a.product.product.sku.cmp(&b.product.product.sku))
        });

        let total_value = money::checked_sum(items.iter().map(|line| line.inventory_value))?;
        let categories = category_stats(&items)?;

        Ok(InventoryReport {
            count: items.len(),
            items,
            total_value,
            categories,
        })
    }

    #[instrument(skip(self))]
    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<TransactionReport, ServiceError> {
        let items = self.transactions.list(filter).await?;
        let total_amount = money::checked_sum(items.iter().map(|t| t.total_amount))?;
        Ok(TransactionReport {
            count: items.len(),
            items,
            total_amount,
        })
    }

    pub async fn revenue_csv(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<String, ServiceError> {
        let report = self.revenue(start, end, group_by).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["period", "revenue", "cost", "profit"])?;
        for p in &report.periods {
            writer.write_record([
                p.period.clone(),
                p.revenue.to_string(),
                p.cost.to_string(),
                p.profit.to_string(),
            ])?;
        }
        writer.write_record([
            "total".to_string(),
            report.total_revenue.to_string(),
            report.total_cost.to_string(),
            report.total_profit.to_string(),
        ])?;
        finish_csv(writer)
    }

    pub async fn inventory_csv(&self) -> Result<String, ServiceError> {
        let report = self.inventory().await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "sku",
            "name",
            "category",
            "supplier",
            "quantity",
            "cost_price",
            "inventory_value",
            "status",
        ])?;
        for line in &report.items {
            let p = &line.product.product;
            writer.write_record([
                p.sku.clone(),
                p.name.clone(),
                p.category.clone(),
                line.product.supplier_name.clone().unwrap_or_default(),
                p.quantity.to_string(),
                p.cost_price.to_string(),
                line.inventory_value.to_string(),
                p.status.to_string(),
            ])?;
        }
        finish_csv(writer)
    }

    pub async fn transactions_csv(&self, filter: &TransactionFilter) -> Result<String, ServiceError> {
        let report = self.transactions(filter).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "date",
            "reference_number",
            "type",
            "sku",
            "product",
            "quantity",
            "price_per_unit",
            "total_amount",
            "performed_by",
            "notes",
        ])?;
        for t in &report.items {
            writer.write_record([
                t.transaction_date.to_rfc3339(),
                t.reference_number.clone().unwrap_or_default(),
                t.transaction_type.to_string(),
                t.product_sku.clone(),
                t.product_name.clone(),
                t.quantity.to_string(),
                t.price_per_unit.to_string(),
                t.total_amount.to_string(),
                t.performed_by_username.clone(),
                t.notes.clone().unwrap_or_default(),
            ])?;
        }
        finish_csv(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn revenue_buckets_by_month() {
        let rows = vec![
            (TransactionType::Import, at(2024, 9, 2), dec!(4000000)),
            (TransactionType::Export, at(2024, 9, 15), dec!(450000)),
            (TransactionType::Export, at(2024, 10, 1), dec!(300000)),
            (TransactionType::Adjustment, at(2024, 10, 2), dec!(0)),
        ];

        let periods = bucket_revenue(rows, GroupBy::Month).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].period, "2024-09");
        assert_eq!(periods[0].revenue, dec!(450000));
        assert_eq!(periods[0].cost, dec!(4000000));
        assert_eq!(periods[0].profit, dec!(-3550000));
        assert_eq!(periods[1].period, "2024-10");
        assert_eq!(periods[1].profit, dec!(300000));
    }

    #[test]
    fn revenue_overflow_is_an_error_not_a_panic() {
        let rows = vec![
            (TransactionType::Export, at(2024, 9, 2), Decimal::MAX),
            (TransactionType::Export, at(2024, 9, 3), dec!(1)),
        ];
        assert!(bucket_revenue(rows, GroupBy::Month).is_err());
    }

    #[test]
    fn period_keys() {
        let t = at(2024, 3, 7);
        assert_eq!(GroupBy::Day.period_key(t), "2024-03-07");
        assert_eq!(GroupBy::Month.period_key(t), "2024-03");
        assert_eq!(GroupBy::Year.period_key(t), "2024");
    }
}
