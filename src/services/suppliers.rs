use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{product, supplier, SupplierStatus};
use crate::errors::ServiceError;

/// Supplier together with the number of products it currently supplies
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SupplierDetail {
    #[serde(flatten)]
    pub supplier: supplier::Model,
    pub product_count: u64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SupplierInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub phone: String,
    pub address: Option<String>,
    pub tax_code: Option<String>,
    pub status: Option<SupplierStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct SupplierUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_code: Option<String>,
    pub status: Option<SupplierStatus>,
}

/// Service for managing suppliers
#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DbPool>,
}

impl SupplierService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Lists suppliers by name, optionally filtered by status
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        status: Option<SupplierStatus>,
    ) -> Result<Vec<supplier::Model>, ServiceError> {
        let mut query = supplier::Entity::find();
        if let Some(status) = status {
            query = query.filter(supplier::Column::Status.eq(status));
        }
        query
            .order_by_asc(supplier::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str) -> Result<Vec<supplier::Model>, ServiceError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ServiceError::BadRequest("keyword is required".to_string()));
        }

        supplier::Entity::find()
            .filter(
                Condition::any()
                    .add(supplier::Column::Name.contains(keyword))
                    .add(supplier::Column::ContactPerson.contains(keyword))
                    .add(supplier::Column::Email.contains(keyword))
                    .add(supplier::Column::Phone.contains(keyword)),
            )
            .order_by_asc(supplier::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))
    }

    async fn product_count(&self, id: Uuid) -> Result<u64, ServiceError> {
        product::Entity::find()
            .filter(product::Column::SupplierId.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<SupplierDetail, ServiceError> {
        let supplier = self.find(id).await?;
        let product_count = self.product_count(id).await?;
        Ok(SupplierDetail {
            supplier,
            product_count,
        })
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(
        &self,
        actor: Uuid,
        input: SupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        input.validate()?;

        let created = supplier::ActiveModel {
            name: Set(input.name.trim().to_string()),
            contact_person: Set(input.contact_person),
            email: Set(input.email),
            phone: Set(input.phone.trim().to_string()),
            address: Set(input.address),
            tax_code: Set(input.tax_code),
            status: Set(input.status.unwrap_or(SupplierStatus::Active)),
            created_by: Set(Some(actor)),
            updated_by: Set(Some(actor)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(supplier_id = %created.id, "Supplier created");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        actor: Uuid,
        id: Uuid,
        changes: SupplierUpdate,
    ) -> Result<supplier::Model, ServiceError> {
        changes.validate()?;
        let mut model: supplier::ActiveModel = self.find(id).await?.into();

        if let Some(name) = changes.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(contact_person) = changes.contact_person {
            model.contact_person = Set(Some(contact_person));
        }
        if let Some(email) = changes.email {
            model.email = Set(Some(email));
        }
        if let Some(phone) = changes.phone {
            model.phone = Set(phone.trim().to_string());
        }
        if let Some(address) = changes.address {
            model.address = Set(Some(address));
        }
        if let Some(tax_code) = changes.tax_code {
            model.tax_code = Set(Some(tax_code));
        }
        if let Some(status) = changes.status {
            model.status = Set(status);
        }
        model.updated_by = Set(Some(actor));

        let updated = model
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(supplier_id = %updated.id, "Supplier updated");
        Ok(updated)
    }

    /// Deletes a supplier no product refers to.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let supplier = self.find(id).await?;

        let products = self.product_count(id).await?;
        if products > 0 {
            return Err(ServiceError::BadRequest(format!(
                "Supplier {} still supplies {} products",
                supplier.name, products
            )));
        }

        supplier::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(supplier_id = %id, "Supplier deleted");
        Ok(())
    }
}
