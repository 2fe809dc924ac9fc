use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "out_of_stock")]
    OutOfStock,
    #[sea_orm(string_value = "discontinued")]
    Discontinued,
}

impl ProductStatus {
    /// Status implied by a new on-hand quantity. Discontinued is sticky.
    pub fn for_quantity(self, quantity: i32) -> ProductStatus {
        match self {
            ProductStatus::Discontinued => ProductStatus::Discontinued,
            _ if quantity <= 0 => ProductStatus::OutOfStock,
            _ => ProductStatus::Available,
        }
    }
}

/// What last wrote `products.quantity`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuantitySource {
    /// Quantity given when the product was created or imported
    #[sea_orm(string_value = "initial")]
    Initial,
    /// A committed ledger entry
    #[sea_orm(string_value = "ledger")]
    Ledger,
    /// The manual quantity override endpoint
    #[sea_orm(string_value = "manual_override")]
    ManualOverride,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "products")]
#[schema(as = Product)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Business key, unique and immutable
    #[sea_orm(unique)]
    pub sku: String,
    pub category: String,
    pub size: String,
    pub color: String,
    /// On-hand quantity, never negative
    pub quantity: i32,
    pub quantity_source: QuantitySource,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub supplier_id: Option<Uuid>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub status: ProductStatus,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id",
        on_delete = "SetNull"
    )]
    Supplier,
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.quantity {
                active_model.quantity = Set(0);
            }
            if let ActiveValue::NotSet = active_model.quantity_source {
                active_model.quantity_source = Set(QuantitySource::Initial);
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        if let ActiveValue::Set(quantity) | ActiveValue::Unchanged(quantity) = active_model.quantity
        {
            if quantity < 0 {
                return Err(DbErr::Custom(
                    "product quantity cannot be negative".to_string(),
                ));
            }
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ProductStatus::Available, 0, ProductStatus::OutOfStock)]
    #[case(ProductStatus::Available, 3, ProductStatus::Available)]
    #[case(ProductStatus::OutOfStock, 5, ProductStatus::Available)]
    #[case(ProductStatus::OutOfStock, 0, ProductStatus::OutOfStock)]
    #[case(ProductStatus::Discontinued, 0, ProductStatus::Discontinued)]
    #[case(ProductStatus::Discontinued, 12, ProductStatus::Discontinued)]
    fn status_follows_quantity(
        #[case] current: ProductStatus,
        #[case] quantity: i32,
        #[case] expected: ProductStatus,
    ) {
        assert_eq!(current.for_quantity(quantity), expected);
    }
}
