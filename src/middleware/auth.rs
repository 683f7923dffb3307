use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;

    // Tokens issued before the last sign-out are dead
    if !state.identity.session_valid(claims.sub, claims.sgen).await? {
        return Err(AppError::Unauthorized("Session has ended".to_string()));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn require_role(request: &Request, role: UserRole, message: &str) -> AppResult<()> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if claims.role != role {
        return Err(AppError::Forbidden(message.to_string()));
    }
    Ok(())
}

/// Require driver role
pub async fn require_driver(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, UserRole::Driver, "Driver access required")?;
    Ok(next.run(request).await)
}

/// Require passenger role
pub async fn require_passenger(request: Request, next: Next) -> AppResult<Response> {
    require_role(&request, UserRole::Passenger, "Passenger access required")?;
    Ok(next.run(request).await)
}
