use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Kind of stock movement recorded by a ledger entry
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
    /// Goods received: quantity is added
    #[sea_orm(string_value = "import")]
    Import,
    /// Goods shipped: quantity is subtracted, never below zero
    #[sea_orm(string_value = "export")]
    Export,
    /// Stock count: quantity is set absolutely
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}

impl TransactionType {
    /// Prefix used for generated reference numbers
    pub fn reference_prefix(self) -> &'static str {
        match self {
            TransactionType::Import => "PO",
            TransactionType::Export => "SO",
            TransactionType::Adjustment => "ADJ",
        }
    }
}

/// Immutable ledger entry
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "transactions")]
#[schema(as = Transaction)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_per_unit: Decimal,
    /// Always `quantity * price_per_unit`
    pub total_amount: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub performed_by: Uuid,
    pub transaction_date: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Restrict"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::PerformedBy",
        to = "super::user::Column::Id",
        on_delete = "Restrict"
    )]
    PerformedBy,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PerformedBy.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            return Err(DbErr::Custom("ledger entries are immutable".to_string()));
        }

        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.id {
            active_model.id = Set(Uuid::new_v4());
        }
        if let ActiveValue::NotSet = active_model.transaction_date {
            active_model.transaction_date = Set(Utc::now());
        }
        Ok(active_model)
    }

    async fn before_delete<C>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom("ledger entries are immutable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn transaction_type_round_trips_through_strings() {
        for (raw, expected) in [
            ("import", TransactionType::Import),
            ("export", TransactionType::Export),
            ("adjustment", TransactionType::Adjustment),
        ] {
            let parsed = TransactionType::from_str(raw).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), raw);
        }
        assert!(TransactionType::from_str("transfer").is_err());
    }

    #[test]
    fn serializes_type_field_as_type() {
        let entry = Model {
            id: Uuid::nil(),
            transaction_type: TransactionType::Export,
            product_id: Uuid::nil(),
            quantity: 3,
            price_per_unit: dec!(150000),
            total_amount: dec!(450000),
            reference_number: None,
            notes: None,
            performed_by: Uuid::nil(),
            transaction_date: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "export");
    }
}
