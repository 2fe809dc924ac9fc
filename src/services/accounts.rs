//! Self-service account flows: registration, login and password changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::users::{NewUser, UserProfile, UserService};
use crate::auth::password::verify_password;
use crate::auth::{AuthService, AuthUser};
use crate::entities::UserRole;
use crate::errors::ServiceError;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResult {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<UserService>,
    auth: Arc<AuthService>,
}

impl AccountService {
    pub fn new(users: Arc<UserService>, auth: Arc<AuthService>) -> Self {
        Self { users, auth }
    }

    /// Public sign-up. Always creates a plain `user` account.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, mut input: NewUser) -> Result<UserProfile, ServiceError> {
        input.role = Some(UserRole::User);
        self.users.create(input).await.map(UserProfile::from)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            warn!("Login attempt for unknown user");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if !user.is_active() {
            return Err(ServiceError::Forbidden("Account is disabled".to_string()));
        }

        let issued = self.auth.generate_token(&user)?;
        info!(user_id = %user.id, "User logged in");

        Ok(LoginResult {
            token: issued.token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
            user: user.into(),
        })
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        self.users.get(user_id).await
    }

    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user = self.users.find(user_id).await?;
        if !verify_password(current_password, &user.password_hash)? {
            return Err(ServiceError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        self.users.set_password(user_id, new_password).await?;
        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Revokes the token the caller authenticated with.
    pub async fn logout(&self, session: &AuthUser) {
        self.auth.revoke(&session.token_id, session.expires_at).await;
        info!(user_id = %session.user_id, "User logged out");
    }
}
