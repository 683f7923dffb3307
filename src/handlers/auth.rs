use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::error::AppResult;
use crate::identity::{Account, NewAccount};
use crate::utils::jwt::{create_token, Claims};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
}

impl From<Account> for UserInfo {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            phone: account.phone,
            role: account.role,
        }
    }
}

fn signed_in(state: &AppState, account: Account) -> AppResult<Json<AuthResponse>> {
    let token = create_token(
        &account,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(Json(AuthResponse {
        token,
        user: account.into(),
    }))
}

/// Register a driver or passenger account
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let account = state.identity.create_account(payload).await?;
    signed_in(&state, account)
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let account = state.identity.sign_in(&payload.email, &payload.password).await?;
    signed_in(&state, account)
}

/// End every session of the caller
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<serde_json::Value>> {
    state.identity.sign_out(claims.sub).await?;
    Ok(Json(serde_json::json!({ "message": "Signed out" })))
}
