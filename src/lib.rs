pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod rides;
pub mod routes;
pub mod store;
pub mod utils;

use std::sync::Arc;

pub use config::Config;
pub use error::{AppError, AppResult};

use identity::IdentityProvider;
use rides::RideBookingService;
use store::KeyValueStore;

#[derive(Clone)]
pub struct AppState {
    pub rides: RideBookingService<dyn KeyValueStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Config,
}
