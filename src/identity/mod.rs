//! Account management the HTTP layer signs users in with.
//!
//! The booking core never touches this: it only sees passenger ids.

mod accounts;
mod password;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::user::UserRole;

pub use accounts::DbIdentityProvider;
pub use password::{hash_password, verify_password};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account not found")]
    UnknownAccount,

    #[error("{0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
    /// Sign-out generation current when the account was loaded.
    pub session_generation: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
    pub password: String,
    pub confirm_password: String,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), AuthError> {
        let blank = [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("password", &self.password),
            ("confirmPassword", &self.confirm_password),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        if let Some((field, _)) = blank {
            return Err(AuthError::Validation(format!("{} must not be empty", field)));
        }
        if !self.email.contains('@') {
            return Err(AuthError::Validation("email is not valid".into()));
        }
        if self.password != self.confirm_password {
            return Err(AuthError::Validation("passwords do not match".into()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, AuthError>;

    /// Invalidate every session issued to `user_id` so far.
    async fn sign_out(&self, user_id: Uuid) -> Result<(), AuthError>;

    /// Whether a session issued under `generation` survives every sign-out
    /// since.
    async fn session_valid(&self, user_id: Uuid, generation: i32) -> Result<bool, AuthError>;
}
