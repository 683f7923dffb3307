use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(String),

    #[error("Ride {0} not found")]
    NotFound(String),

    #[error("Passenger {passenger_id} already holds a seat on ride {ride_id}")]
    AlreadyBooked { ride_id: String, passenger_id: String },

    #[error("Passenger {passenger_id} has no booking on ride {ride_id}")]
    NotBooked { ride_id: String, passenger_id: String },

    #[error("No seats left on ride {0}")]
    NoSeatsAvailable(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl BookingError {
    /// Only backend failures are worth retrying; everything else will fail the
    /// same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Storage(_))
    }
}
