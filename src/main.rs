use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripshare_backend::{
    config::Config,
    db,
    identity::DbIdentityProvider,
    middleware::rate_limit::{create_global_governor, log_request},
    rides::RideBookingService,
    routes, AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripshare_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    let store = db::ride_store(&config, &db);
    tracing::info!(backend = ?config.ride_store, "Ride store ready");

    let state = AppState {
        rides: RideBookingService::new(store, config.booking()),
        identity: Arc::new(DbIdentityProvider::new(db)),
        config: config.clone(),
    };

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(create_global_governor());

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
