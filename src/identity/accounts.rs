use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use super::password::{hash_password, verify_password};
use super::{Account, AuthError, IdentityProvider, NewAccount};
use crate::entities::user;

/// Accounts stored in the `user` table, passwords hashed with argon2.
#[derive(Clone)]
pub struct DbIdentityProvider {
    db: DatabaseConnection,
}

impl DbIdentityProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, AuthError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }
}

impl From<user::Model> for Account {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            phone: model.phone,
            role: model.role,
            session_generation: model.session_generation,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityProvider for DbIdentityProvider {
    async fn create_account(&self, account: NewAccount) -> Result<Account, AuthError> {
        account.validate()?;
        let email = normalize_email(&account.email);

        if self.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(&account.password)?;
        let new_user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            password_hash: Set(password_hash),
            name: Set(account.name.trim().to_string()),
            phone: Set(account.phone.trim().to_string()),
            role: Set(account.role),
            session_generation: Set(0),
            ..Default::default()
        };

        let user = new_user.insert(&self.db).await?;
        tracing::info!(user_id = %user.id, role = ?user.role, "Account created");
        Ok(user.into())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let user = self
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Rejected sign-in");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user.into())
    }

    async fn sign_out(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = user::Entity::update_many()
            .col_expr(
                user::Column::SessionGeneration,
                Expr::col(user::Column::SessionGeneration).add(1),
            )
            .col_expr(user::Column::SignedOutAt, Expr::value(Utc::now().fixed_offset()))
            .filter(user::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AuthError::UnknownAccount);
        }
        tracing::info!(user_id = %user_id, "Signed out");
        Ok(())
    }

    async fn session_valid(&self, user_id: Uuid, generation: i32) -> Result<bool, AuthError> {
        let user = user::Entity::find_by_id(user_id).one(&self.db).await?;
        Ok(user.is_some_and(|user| user.session_generation == generation))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::entities::user::UserRole;

    fn stored_user(generation: i32) -> user::Model {
        user::Model {
            id: Uuid::nil(),
            email: "chebet@example.com".into(),
            password_hash: hash_password("pass1234").unwrap(),
            name: "Chebet".into(),
            phone: "0755000111".into(),
            role: UserRole::Passenger,
            session_generation: generation,
            signed_out_at: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_right_after_sign_out_is_valid() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .append_query_results([vec![stored_user(1)]])
            .append_query_results([vec![stored_user(1)]])
            .append_query_results([vec![stored_user(1)]])
            .into_connection();
        let identity = DbIdentityProvider::new(db);

        identity.sign_out(Uuid::nil()).await.unwrap();
        let account = identity.sign_in("Chebet@example.com", "pass1234").await.unwrap();
        assert_eq!(account.session_generation, 1);

        // Same second as the sign-out, still a live session
        assert!(identity.session_valid(account.id, account.session_generation).await.unwrap());
        // Token from before the sign-out is dead
        assert!(!identity.session_valid(account.id, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_sign_out_of_unknown_account() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 0 }])
            .into_connection();
        let identity = DbIdentityProvider::new(db);

        assert!(matches!(
            identity.sign_out(Uuid::new_v4()).await,
            Err(AuthError::UnknownAccount)
        ));
    }

    #[tokio::test]
    async fn test_missing_user_has_no_session() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();
        let identity = DbIdentityProvider::new(db);

        assert!(!identity.session_valid(Uuid::new_v4(), 0).await.unwrap());
    }
}
