use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::password::{hash_password, validate_password_strength};
use crate::db::DbPool;
use crate::entities::{transaction, user, UserRole, UserStatus};
use crate::errors::ServiceError;

/// User as exposed over the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            full_name: model.full_name,
            email: model.email,
            phone: model.phone,
            role: model.role,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewUser {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UserUpdate {
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    /// Replaces the password when present
    pub password: Option<String>,
}

/// Service for user administration
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        role: Option<UserRole>,
        status: Option<UserStatus>,
    ) -> Result<Vec<UserProfile>, ServiceError> {
        let mut query = user::Entity::find();
        if let Some(role) = role {
            query = query.filter(user::Column::Role.eq(role));
        }
        if let Some(status) = status {
            query = query.filter(user::Column::Status.eq(status));
        }

        let users = query
            .order_by_asc(user::Column::Username)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    pub(crate) async fn find(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }

    pub(crate) async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<UserProfile, ServiceError> {
        self.find(id).await.map(UserProfile::from)
    }

    /// Rejects a username or email that belongs to another account.
    async fn ensure_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut clash = Condition::any();
        if let Some(username) = username {
            clash = clash.add(user::Column::Username.eq(username));
        }
        if let Some(email) = email {
            clash = clash.add(user::Column::Email.eq(email));
        }

        let mut query = user::Entity::find().filter(clash);
        if let Some(id) = except {
            query = query.filter(user::Column::Id.ne(id));
        }

        if let Some(existing) = query.one(&*self.db).await.map_err(ServiceError::db_error)? {
            let field = if Some(existing.username.as_str()) == username {
                "Username"
            } else {
                "Email"
            };
            return Err(ServiceError::BadRequest(format!("{} already in use", field)));
        }
        Ok(())
    }

    /// Creates an account; role defaults to `user`.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create(&self, input: NewUser) -> Result<user::Model, ServiceError> {
        input.validate()?;
        validate_password_strength(&input.password)?;

        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        self.ensure_unique(Some(&username), Some(&email), None)
            .await?;

        let created = user::ActiveModel {
            username: Set(username),
            password_hash: Set(hash_password(&input.password)?),
            full_name: Set(input.full_name.trim().to_string()),
            email: Set(email),
            phone: Set(input.phone),
            role: Set(input.role.unwrap_or(UserRole::User)),
            status: Set(UserStatus::Active),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(user_id = %created.id, role = %created.role, "User created");
        Ok(created)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: UserUpdate) -> Result<UserProfile, ServiceError> {
        changes.validate()?;
        let existing = self.find(id).await?;

        let email = changes.email.map(|e| e.trim().to_lowercase());
        if email.is_some() {
            self.ensure_unique(None, email.as_deref(), Some(id)).await?;
        }

        let mut model: user::ActiveModel = existing.into();
        if let Some(full_name) = changes.full_name {
            model.full_name = Set(full_name.trim().to_string());
        }
        if let Some(email) = email {
            model.email = Set(email);
        }
        if let Some(phone) = changes.phone {
            model.phone = Set(Some(phone));
        }
        if let Some(role) = changes.role {
            model.role = Set(role);
        }
        if let Some(password) = changes.password {
            validate_password_strength(&password)?;
            model.password_hash = Set(hash_password(&password)?);
        }

        let updated = model
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(user_id = %updated.id, "User updated");
        Ok(updated.into())
    }

    pub(crate) async fn set_password(&self, id: Uuid, password: &str) -> Result<(), ServiceError> {
        validate_password_strength(password)?;
        let mut model: user::ActiveModel = self.find(id).await?.into();
        model.password_hash = Set(hash_password(password)?);
        model
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        actor: Uuid,
        id: Uuid,
        status: UserStatus,
    ) -> Result<UserProfile, ServiceError> {
        if actor == id {
            return Err(ServiceError::BadRequest(
                "You cannot change your own status".to_string(),
            ));
        }

        let mut model: user::ActiveModel = self.find(id).await?.into();
        model.status = Set(status);
        let updated = model
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(user_id = %id, status = %status, "User status changed");
        Ok(updated.into())
    }

    /// Hard delete; users who have performed ledger entries must be deactivated instead.
    #[instrument(skip(self))]
    pub async fn delete(&self, actor: Uuid, id: Uuid) -> Result<(), ServiceError> {
        if actor == id {
            return Err(ServiceError::BadRequest(
                "You cannot delete your own account".to_string(),
            ));
        }
        let existing = self.find(id).await?;

        let entries = transaction::Entity::find()
            .filter(transaction::Column::PerformedBy.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if entries > 0 {
            warn!(user_id = %id, entries, "Refusing to delete user with ledger history");
            return Err(ServiceError::Conflict(format!(
                "User {} has performed {} ledger entries; deactivate the account instead",
                existing.username, entries
            )));
        }

        user::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(user_id = %id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_drops_password_hash() {
        let now = Utc::now();
        let model = user::Model {
            id: Uuid::new_v4(),
            username: "thu.kho".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            full_name: "Thu Kho".to_string(),
            email: "kho@example.com".to_string(),
            phone: None,
            role: UserRole::User,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(UserProfile::from(model)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn new_user_validation() {
        let input = NewUser {
            username: "ab".to_string(),
            password: "secret1".to_string(),
            full_name: "A B".to_string(),
            email: "ab@example.com".to_string(),
            phone: None,
            role: None,
        };
        assert!(input.validate().is_err());
    }
}
