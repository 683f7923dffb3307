use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{auth, driver, passenger, rides};
use crate::middleware::auth::{auth_middleware, require_driver, require_passenger};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let passenger_governor = create_role_governor(RateLimitedRole::Passenger);
    let public_governor = create_public_governor();

    // Public routes (rate limited per IP)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Any signed-in user
    let session_routes = Router::new()
        .route("/logout", post(auth::logout))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Ride browsing, no account needed
    let public_routes = Router::new()
        .route("/rides", get(rides::list_rides))
        .route("/rides/stream", get(rides::stream_rides))
        .route("/rides/{id}", get(rides::get_ride))
        .layer(public_governor);

    // Driver routes (requires auth + driver role)
    let driver_routes = Router::new()
        .route("/rides", post(driver::add_ride))
        .route("/rides/{id}", put(driver::update_ride).delete(driver::delete_ride))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Passenger routes (requires auth + passenger role)
    let passenger_routes = Router::new()
        .route("/", get(passenger::my_bookings))
        .route(
            "/{ride_id}",
            post(passenger::book_ride).delete(passenger::cancel_booking),
        )
        .layer(passenger_governor)
        .layer(middleware::from_fn(require_passenger))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes.merge(session_routes))
        .nest("/api", public_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/bookings", passenger_routes)
        .with_state(state)
}
