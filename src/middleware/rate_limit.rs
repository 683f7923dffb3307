use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorError, GovernorLayer};

/// Type alias for IP-keyed governor layers
pub type IpGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

fn ip_governor(per_ms: u64, burst: u32) -> IpGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .finish()
            .expect("rate limit period and burst size are non-zero"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}

/// Global rate limiting per IP address
/// - 1000 requests per minute (one token every 60ms)
/// - Applied before authentication to protect against floods
pub fn create_global_governor() -> IpGovernorLayer {
    ip_governor(60, 1000)
}

/// Public routes (auth, ride listing): 100 requests per minute per IP
pub fn create_public_governor() -> IpGovernorLayer {
    ip_governor(600, 100)
}

pub fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    let (status, message) = match error {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many requests, retry in {} s", wait_time),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Unable to identify client".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (
            code,
            msg.unwrap_or_else(|| "Rate limiter error".to_string()),
        ),
    };

    (status, Json(json!({ "error": message }))).into_response()
}

/// Middleware to log rate limiting and request details
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::debug!(
        client_ip = %addr.ip(),
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            "RATE LIMITED - Request rejected due to too many requests"
        );
    } else if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            status = %status,
            "Request failed"
        );
    } else {
        tracing::debug!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            status = %status,
            "Request completed"
        );
    }

    response
}
