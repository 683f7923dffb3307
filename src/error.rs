use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::identity::AuthError;
use crate::rides::BookingError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Unavailable(msg) | AppError::Timeout(msg) => {
                tracing::warn!("Storage failure: {}", msg);
                msg
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Internal(format!("Database error: {}", err))
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::BadRequest(msg),
            BookingError::NotFound(_) => AppError::NotFound(err.to_string()),
            BookingError::AlreadyBooked { .. }
            | BookingError::NotBooked { .. }
            | BookingError::NoSeatsAvailable(_) => AppError::Conflict(err.to_string()),
            BookingError::Storage(StoreError::Timeout(_)) => AppError::Timeout(err.to_string()),
            BookingError::Storage(StoreError::Malformed { .. }) => AppError::Internal(err.to_string()),
            BookingError::Storage(_) => AppError::Unavailable(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => AppError::BadRequest(msg),
            AuthError::EmailTaken => AppError::Conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::UnknownAccount => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::Internal(msg) => AppError::Internal(msg),
            AuthError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_booking_errors_map_to_status() {
        let cases = [
            (BookingError::Validation("seats".into()), StatusCode::BAD_REQUEST),
            (BookingError::NotFound("r1".into()), StatusCode::NOT_FOUND),
            (BookingError::NoSeatsAvailable("r1".into()), StatusCode::CONFLICT),
            (
                BookingError::AlreadyBooked { ride_id: "r1".into(), passenger_id: "p".into() },
                StatusCode::CONFLICT,
            ),
            (
                BookingError::Storage(StoreError::Timeout(Duration::from_secs(5))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                BookingError::Storage(StoreError::Unavailable("offline".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_auth_errors_map_to_status() {
        assert_eq!(
            AppError::from(AuthError::EmailTaken).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
