use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money;
use super::transactions::{apply_stock_change, flatten_txn_error, StockChange};
use crate::db::DbPool;
use crate::entities::{product, supplier, transaction, ProductStatus, QuantitySource};
use crate::errors::ServiceError;

/// Columns written by the CSV export, in order
pub const CSV_HEADERS: [&str; 9] = [
    "sku",
    "name",
    "category",
    "size",
    "color",
    "quantity",
    "cost_price",
    "selling_price",
    "status",
];

/// Maps an incoming CSV header (English or Vietnamese) onto its export name.
fn canonical_header(raw: &str) -> Option<&'static str> {
    let normalized = raw
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");

    match normalized.as_str() {
        "sku" | "ma_sp" => Some("sku"),
        "name" | "ten_sp" => Some("name"),
        "category" | "danh_muc" => Some("category"),
        "size" | "kich_co" => Some("size"),
        "color" | "mau_sac" => Some("color"),
        "quantity" | "so_luong" => Some("quantity"),
        "cost_price" | "gia_nhap" => Some("cost_price"),
        "selling_price" | "gia_ban" => Some("selling_price"),
        "status" | "trang_thai" => Some("status"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Name,
    Sku,
    Quantity,
    SellingPrice,
    CreatedAt,
}

impl ProductSort {
    fn column(self) -> product::Column {
        match self {
            ProductSort::Name => product::Column::Name,
            ProductSort::Sku => product::Column::Sku,
            ProductSort::Quantity => product::Column::Quantity,
            ProductSort::SellingPrice => product::Column::SellingPrice,
            ProductSort::CreatedAt => product::Column::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
    pub supplier_id: Option<Uuid>,
    pub sort: ProductSort,
    pub descending: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Product with its supplier's display name
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub supplier_name: Option<String>,
}

impl From<(product::Model, Option<supplier::Model>)> for ProductView {
    fn from((product, supplier): (product::Model, Option<supplier::Model>)) -> Self {
        Self {
            product,
            supplier_name: supplier.map(|s| s.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub category: String,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub supplier_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
}

/// Descriptive fields and prices. Quantity and SKU are not editable here.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportRowError {
    /// 1-based line number in the uploaded file, header included
    pub row: usize,
    pub sku: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ImportRowError>,
}

fn require_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn require_price(field: &str, value: Decimal) -> Result<Decimal, ServiceError> {
    money::validate_amount(field, value)
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ServiceError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("{} is not a number: {}", field, raw)))
}

/// Service for the product catalogue
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, ServiceError> {
        let mut query = product::Entity::find().find_also_related(supplier::Entity);

        if let Some(category) = filter.category.as_deref() {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(status) = filter.status {
            query = query.filter(product::Column::Status.eq(status));
        }
        if let Some(supplier_id) = filter.supplier_id {
            query = query.filter(product::Column::SupplierId.eq(supplier_id));
        }

        query = if filter.descending {
            query.order_by_desc(filter.sort.column())
        } else {
            query.order_by_asc(filter.sort.column())
        };

        let rows = query
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows.into_iter().map(ProductView::from).collect())
    }

    /// Matches name, SKU or category
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str) -> Result<Vec<ProductView>, ServiceError> {
        let keyword = require_text("keyword", keyword)?;

        let rows = product::Entity::find()
            .find_also_related(supplier::Entity)
            .filter(
                Condition::any()
                    .add(product::Column::Name.contains(&keyword))
                    .add(product::Column::Sku.contains(&keyword))
                    .add(product::Column::Category.contains(&keyword)),
            )
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows.into_iter().map(ProductView::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<ProductView, ServiceError> {
        product::Entity::find_by_id(id)
            .find_also_related(supplier::Entity)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(ProductView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    pub async fn find_by_sku(&self, sku: &str) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find()
            .filter(product::Column::Sku.eq(sku))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn ensure_supplier(&self, supplier_id: Option<Uuid>) -> Result<(), ServiceError> {
        let Some(id) = supplier_id else {
            return Ok(());
        };
        let exists = supplier::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .is_some();
        if !exists {
            return Err(ServiceError::BadRequest(format!(
                "Supplier {} does not exist",
                id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(
        &self,
        actor: Uuid,
        input: NewProduct,
    ) -> Result<product::Model, ServiceError> {
        let sku = require_text("sku", &input.sku)?;
        let name = require_text("name", &input.name)?;
        let category = require_text("category", &input.category)?;
        let size = require_text("size", &input.size)?;
        let color = require_text("color", &input.color)?;
        let cost_price = require_price("cost_price", input.cost_price)?;
        let selling_price = require_price("selling_price", input.selling_price)?;
        if input.quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }

        if self.find_by_sku(&sku).await?.is_some() {
            return Err(ServiceError::BadRequest(format!("SKU {} already exists", sku)));
        }
        self.ensure_supplier(input.supplier_id).await?;

        let status = input
            .status
            .unwrap_or(ProductStatus::Available)
            .for_quantity(input.quantity);

        let created = product::ActiveModel {
            name: Set(name),
            sku: Set(sku),
            category: Set(category),
            size: Set(size),
            color: Set(color),
            quantity: Set(input.quantity),
            quantity_source: Set(QuantitySource::Initial),
            cost_price: Set(cost_price),
            selling_price: Set(selling_price),
            supplier_id: Set(input.supplier_id),
            description: Set(input.description),
            image_url: Set(input.image_url),
            status: Set(status),
            created_by: Set(Some(actor)),
            updated_by: Set(Some(actor)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(product_id = %created.id, sku = %created.sku, "Product created");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        actor: Uuid,
        id: Uuid,
        changes: ProductUpdate,
    ) -> Result<product::Model, ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        self.ensure_supplier(changes.supplier_id).await?;

        let quantity = existing.quantity;
        let mut model: product::ActiveModel = existing.into();

        if let Some(name) = changes.name {
            model.name = Set(require_text("name", &name)?);
        }
        if let Some(category) = changes.category {
            model.category = Set(require_text("category", &category)?);
        }
        if let Some(size) = changes.size {
            model.size = Set(require_text("size", &size)?);
        }
        if let Some(color) = changes.color {
            model.color = Set(require_text("color", &color)?);
        }
        if let Some(price) = changes.cost_price {
            model.cost_price = Set(require_price("cost_price", price)?);
        }
        if let Some(price) = changes.selling_price {
            model.selling_price = Set(require_price("selling_price", price)?);
        }
        if let Some(supplier_id) = changes.supplier_id {
            model.supplier_id = Set(Some(supplier_id));
        }
        if let Some(description) = changes.description {
            model.description = Set(Some(description));
        }
        if let Some(image_url) = changes.image_url {
            model.image_url = Set(Some(image_url));
        }
        if let Some(status) = changes.status {
            // Only discontinuing is a free choice; otherwise stock decides
            let status = match status {
                ProductStatus::Discontinued => ProductStatus::Discontinued,
                _ => ProductStatus::Available.for_quantity(quantity),
            };
            model.status = Set(status);
        }
        model.updated_by = Set(Some(actor));

        let updated = model
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(product_id = %updated.id, "Product updated");
        Ok(updated)
    }

    /// Sets stock directly, outside the ledger. Recorded as a manual override.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        actor: Uuid,
        id: Uuid,
        quantity: i32,
        reason: Option<String>,
    ) -> Result<product::Model, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }

        let updated = self
            .db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    apply_stock_change(
                        txn,
                        id,
                        StockChange::Set(quantity),
                        actor,
                        QuantitySource::ManualOverride,
                    )
                    .await
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        info!(
            product_id = %id,
            quantity,
            reason = reason.as_deref().unwrap_or(""),
            "Product quantity overridden"
        );
        Ok(updated)
    }

    /// Deletes a product that has never been moved through the ledger.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let entries = transaction::Entity::find()
            .filter(transaction::Column::ProductId.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if entries > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} has {} ledger entries; mark it discontinued instead",
                existing.sku, entries
            )));
        }

        product::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(product_id = %id, sku = %existing.sku, "Product deleted");
        Ok(())
    }

    /// Full catalogue as CSV, ordered by SKU
    #[instrument(skip(self))]
    pub async fn export_csv(&self) -> Result<String, ServiceError> {
        let products = product::Entity::find()
            .order_by_asc(product::Column::Sku)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADERS)?;
        for p in &products {
            writer.write_record([
                p.sku.clone(),
                p.name.clone(),
                p.category.clone(),
                p.size.clone(),
                p.color.clone(),
                p.quantity.to_string(),
                p.cost_price.to_string(),
                p.selling_price.to_string(),
                p.status.to_string(),
            ])?;
        }

        finish_csv(writer)
    }

    /// Creates unknown SKUs and refreshes descriptive fields of known ones.
    ///
    /// Rows are applied independently; a bad row is reported and skipped.
    /// Stock of existing products is never touched.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn import_csv(&self, actor: Uuid, data: &[u8]) -> Result<ImportReport, ServiceError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(data);

        let columns: HashMap<&'static str, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| canonical_header(raw).map(|name| (name, idx)))
            .collect();

        if !columns.contains_key("sku") {
            return Err(ServiceError::BadRequest(
                "CSV must contain a sku (ma_sp) column".to_string(),
            ));
        }

        let mut report = ImportReport::default();

        for (idx, record) in reader.records().enumerate() {
            let row = idx + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    report.errors.push(ImportRowError {
                        row,
                        sku: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let field = |name: &str| {
                columns
                    .get(name)
                    .and_then(|i| record.get(*i))
                    .filter(|v| !v.is_empty())
            };

            let Some(sku) = field("sku").map(str::to_string) else {
                report.errors.push(ImportRowError {
                    row,
                    sku: None,
                    message: "sku is required".to_string(),
                });
                continue;
            };

            let outcome = match self.find_by_sku(&sku).await {
                Ok(Some(existing)) => self
                    .import_update(actor, existing.id, &field)
                    .await
                    .map(|_| false),
                Ok(None) => self.import_create(actor, &sku, &field).await.map(|_| true),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => report.errors.push(ImportRowError {
                    row,
                    sku: Some(sku),
                    message: e.response_message(),
                }),
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            failed = report.errors.len(),
            "Product CSV import finished"
        );
        Ok(report)
    }

    async fn import_update<'a>(
        &self,
        actor: Uuid,
        id: Uuid,
        field: &impl Fn(&str) -> Option<&'a str>,
    ) -> Result<product::Model, ServiceError> {
        let changes = ProductUpdate {
            name: field("name").map(str::to_string),
            category: field("category").map(str::to_string),
            size: field("size").map(str::to_string),
            color: field("color").map(str::to_string),
            cost_price: field("cost_price")
                .map(|v| parse_decimal("cost_price", v))
                .transpose()?,
            selling_price: field("selling_price")
                .map(|v| parse_decimal("selling_price", v))
                .transpose()?,
            ..Default::default()
        };
        self.update(actor, id, changes).await
    }

    async fn import_create<'a>(
        &self,
        actor: Uuid,
        sku: &str,
        field: &impl Fn(&str) -> Option<&'a str>,
    ) -> Result<product::Model, ServiceError> {
        let quantity = field("quantity")
            .map(|v| {
                v.parse::<i32>().map_err(|_| {
                    ServiceError::ValidationError(format!("quantity is not an integer: {}", v))
                })
            })
            .transpose()?
            .unwrap_or(0);

        let status = field("status")
            .map(|v| {
                ProductStatus::from_str(v)
                    .map_err(|_| ServiceError::ValidationError(format!("unknown status: {}", v)))
            })
            .transpose()?;

        let input = NewProduct {
            name: field("name").unwrap_or_default().to_string(),
            sku: sku.to_string(),
            category: field("category").unwrap_or_default().to_string(),
            size: field("size").unwrap_or_default().to_string(),
            color: field("color").unwrap_or_default().to_string(),
            quantity,
            cost_price: field("cost_price")
                .map(|v| parse_decimal("cost_price", v))
                .transpose()?
                .unwrap_or(Decimal::ZERO),
            selling_price: field("selling_price")
                .map(|v| parse_decimal("selling_price", v))
                .transpose()?
                .unwrap_or(Decimal::ZERO),
            supplier_id: None,
            description: None,
            image_url: None,
            status,
        };
        self.create(actor, input).await
    }
}

pub(crate) fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String, ServiceError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ServiceError::InternalError(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ServiceError::InternalError(format!("CSV is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("sku", Some("sku"))]
    #[case("ma_sp", Some("sku"))]
    #[case("\u{feff}Ma SP", Some("sku"))]
    #[case("Ten_SP", Some("name"))]
    #[case("gia ban", Some("selling_price"))]
    #[case("so_luong", Some("quantity"))]
    #[case("Selling-Price", Some("selling_price"))]
    #[case("warehouse", None)]
    fn csv_header_aliases(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(canonical_header(raw), expected);
    }

    #[test]
    fn sort_parses_from_query_values() {
        assert_eq!(ProductSort::from_str("selling_price").unwrap(), ProductSort::SellingPrice);
        assert_eq!(ProductSort::default(), ProductSort::Name);
        assert!(ProductSort::from_str("supplier").is_err());
    }

    #[test]
    fn price_and_text_guards() {
        assert!(require_price("cost_price", Decimal::new(-1, 0)).is_err());
        assert!(require_price("cost_price", Decimal::ZERO).is_ok());
        assert!(require_price("selling_price", Decimal::new(1999, 2)).is_ok());
        assert!(require_price("selling_price", Decimal::new(5, 3)).is_err());
        assert!(require_price("cost_price", Decimal::MAX).is_err());
        assert_eq!(require_text("name", "  Air Max ").unwrap(), "Air Max");
        assert!(require_text("name", "   ").is_err());
        assert!(parse_decimal("cost_price", "12.50").is_ok());
        assert!(parse_decimal("cost_price", "12,50").is_err());
    }
}
