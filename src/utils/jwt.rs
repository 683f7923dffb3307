use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::identity::Account;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user id, doubles as the passenger id on bookings
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
    /// Sign-out generation the token was issued under
    #[serde(default)]
    pub sgen: i32,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn passenger_id(&self) -> String {
        self.sub.to_string()
    }
}

pub fn create_token(account: &Account, secret: &str, expiration_hours: i64) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub: account.id,
        email: account.email.clone(),
        name: account.name.clone(),
        phone: account.phone.clone(),
        role: account.role,
        sgen: account.session_generation,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: UserRole) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "njeri@example.com".into(),
            name: "Njeri".into(),
            phone: "0711111111".into(),
            role,
            session_generation: 2,
        }
    }

    #[test]
    fn test_token_round_trip_keeps_identity() {
        let driver = account(UserRole::Driver);
        let token = create_token(&driver, "secret", 1).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.sub, driver.id);
        assert_eq!(claims.role, UserRole::Driver);
        assert_eq!(claims.phone, "0711111111");
        assert_eq!(claims.passenger_id(), driver.id.to_string());
        assert_eq!(claims.sgen, 2);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = create_token(&account(UserRole::Passenger), "secret", 1).unwrap();
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let token = create_token(&account(UserRole::Passenger), "secret", -2).unwrap();
        assert!(matches!(verify_token(&token, "secret"), Err(AppError::Unauthorized(_))));
    }
}
