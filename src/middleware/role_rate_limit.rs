use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::KeyExtractor,
    GovernorError, GovernorLayer,
};
use uuid::Uuid;

use crate::middleware::rate_limit::rate_limit_error_handler;
use crate::utils::jwt::Claims;

/// Keys rate limits on the user id from JWT claims (set by auth_middleware)
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = Uuid;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let claims = req
            .extensions()
            .get::<Claims>()
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(claims.sub)
    }
}

pub type RoleGovernorLayer = GovernorLayer<
    UserIdExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

pub enum RateLimitedRole {
    Driver,
    Passenger,
}

/// Per-user limits
/// - Driver: 250 requests per minute
/// - Passenger: 50 requests per minute, bursts of 100 for the booking screens
pub fn create_role_governor(role: RateLimitedRole) -> RoleGovernorLayer {
    let (per_ms, burst) = match role {
        RateLimitedRole::Driver => (240, 500),
        RateLimitedRole::Passenger => (1200, 100),
    };

    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .key_extractor(UserIdExtractor)
            .finish()
            .expect("rate limit period and burst size are non-zero"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}
