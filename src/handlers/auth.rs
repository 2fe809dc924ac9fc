use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::{created_response, message_response, success_response};
use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ApiError,
    services::{
        accounts::LoginResult,
        users::{NewUser, UserProfile},
    },
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Empty {}

/// Login and registration are public; the rest needs a token.
pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/login", post(login))
        .route("/register", post(register));

    let session = Router::new()
        .route("/me", get(me))
        .route("/change-password", post(change_password))
        .route("/logout", post(logout))
        .with_auth();

    public.merge(session)
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Bearer token and profile", body = LoginResult),
        (status = 400, description = "Missing username or password", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account disabled", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    };

    let result = state.services.accounts.login(&username, &password).await?;
    Ok(message_response(result, "Login successful"))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created with role user", body = UserProfile),
        (status = 400, description = "Invalid input or duplicate username/email", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let profile = state
        .services
        .accounts
        .register(NewUser {
            username: payload.username,
            password: payload.password,
            full_name: payload.full_name,
            email: payload.email,
            phone: payload.phone,
            role: None,
        })
        .await?;
    Ok(created_response(profile))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    Ok(success_response(state.services.accounts.me(user.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new one", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let (Some(current), Some(new)) = (payload.current_password, payload.new_password) else {
        return Err(ApiError::BadRequest(
            "current_password and new_password are required".to_string(),
        ));
    };

    state
        .services
        .accounts
        .change_password(user.user_id, &current, &new)
        .await?;
    Ok(message_response(Empty {}, "Password changed"))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Token revoked"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    state.services.accounts.logout(&user).await;
    Ok(message_response(Empty {}, "Logged out"))
}
