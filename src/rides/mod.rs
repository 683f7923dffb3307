//! Ride inventory and seat booking.

mod error;
pub mod feed;
pub mod model;
pub mod service;

pub use error::BookingError;
pub use feed::{LiveRides, RideFeed, RideWatch};
pub use model::{MAX_SEATS, Ride, RideDetails, RideStatus, UNSPECIFIED, derive_status};
pub use service::{BookingConfig, RIDES, RideBookingService};
