use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::feed::{RideFeed, RideWatch};
use super::{BookingError, Ride, RideDetails};
use crate::store::{CasOutcome, KeyValueStore, StoreError, StoreResult};

/// Collection holding every ride, one record per ride id.
pub const RIDES: &str = "rides";

const BOOKED_BY: &str = "bookedBy";

#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Upper bound on any single store round-trip.
    pub store_timeout: Duration,
    /// Read-modify-write attempts before giving up on a contended ride.
    pub max_attempts: u32,
    /// Pause after the n-th lost race is `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            max_attempts: 5,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

/// Owns ride records and keeps seat accounting consistent.
///
/// Every mutation of an existing ride is a compare-and-set loop against the
/// freshest stored version, so two passengers racing for the last seat cannot
/// both win and a booking is never erased by a stale write.
pub struct RideBookingService<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    config: BookingConfig,
}

impl<S: KeyValueStore + ?Sized> Clone for RideBookingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyValueStore + ?Sized> RideBookingService<S> {
    pub fn new(store: Arc<S>, config: BookingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.config.store_timeout))?
    }

    /// Every ride currently stored, in creation order.
    pub async fn list_rides(&self) -> Result<Vec<Ride>, BookingError> {
        let snapshot = self.bounded(self.store.list(RIDES)).await?;
        Ok(snapshot
            .iter()
            .map(|(id, versioned)| Ride::from_record(id, &versioned.record))
            .collect())
    }

    pub async fn get_ride(&self, id: &str) -> Result<Ride, BookingError> {
        let versioned = self
            .bounded(self.store.get(RIDES, id))
            .await?
            .ok_or_else(|| BookingError::NotFound(id.to_string()))?;
        Ok(Ride::from_record(id, &versioned.record))
    }

    pub async fn add_ride(&self, details: RideDetails) -> Result<Ride, BookingError> {
        let details = details.validated()?;

        for attempt in 1..=self.config.max_attempts {
            let id = self.bounded(self.store.generate_id(RIDES)).await?;
            let ride = Ride::new(id.clone(), details.clone());
            match self
                .bounded(self.store.compare_and_set(RIDES, &id, None, ride.to_record()))
                .await?
            {
                CasOutcome::Applied { .. } => {
                    tracing::info!(
                        ride_id = %ride.id,
                        origin = %ride.origin,
                        destination = %ride.destination,
                        seats = ride.seats_available,
                        "Ride added"
                    );
                    return Ok(ride);
                }
                CasOutcome::Conflict { .. } => {
                    tracing::warn!(ride_id = %id, attempt, "Generated ride id already taken");
                }
            }
        }

        Err(StoreError::Contention {
            collection: RIDES.to_string(),
            id: "<new>".to_string(),
            attempts: self.config.max_attempts,
        }
        .into())
    }

    /// Replace the driver-editable fields. Existing bookings are kept and the
    /// free seat count is recomputed from the new capacity.
    pub async fn update_ride(&self, id: &str, details: RideDetails) -> Result<Ride, BookingError> {
        let details = details.validated()?;
        let ride = self
            .mutate(id, "update", |current| current.replaced(details.clone()))
            .await?;
        tracing::info!(ride_id = %id, seats_available = ride.seats_available, "Ride updated");
        Ok(ride)
    }

    /// Removing a ride that is already gone is fine.
    pub async fn delete_ride(&self, id: &str) -> Result<(), BookingError> {
        self.bounded(self.store.remove(RIDES, id)).await?;
        tracing::info!(ride_id = %id, "Ride deleted");
        Ok(())
    }

    pub async fn book_ride(&self, id: &str, passenger_id: &str) -> Result<Ride, BookingError> {
        let passenger_id = required_passenger(passenger_id)?;
        let ride = self
            .mutate(id, "book", |current| current.booked(passenger_id))
            .await?;
        tracing::info!(
            ride_id = %id,
            passenger_id = %passenger_id,
            seats_available = ride.seats_available,
            "Seat booked"
        );
        Ok(ride)
    }

    pub async fn cancel_booking(&self, id: &str, passenger_id: &str) -> Result<Ride, BookingError> {
        let passenger_id = required_passenger(passenger_id)?;
        let ride = self
            .mutate(id, "cancel", |current| current.cancelled(passenger_id))
            .await?;
        tracing::info!(
            ride_id = %id,
            passenger_id = %passenger_id,
            seats_available = ride.seats_available,
            "Booking cancelled"
        );
        Ok(ride)
    }

    /// Rides on which `passenger_id` currently holds a seat.
    pub async fn list_my_bookings(&self, passenger_id: &str) -> Result<Vec<Ride>, BookingError> {
        let passenger_id = required_passenger(passenger_id)?;
        let snapshot = match self
            .bounded(self.store.find_by_member(RIDES, BOOKED_BY, passenger_id))
            .await?
        {
            Some(filtered) => filtered,
            None => self.bounded(self.store.list(RIDES)).await?,
        };

        // The store filter may over-match (a string field equal to the id), so
        // membership is decided on the decoded ride.
        Ok(snapshot
            .iter()
            .map(|(id, versioned)| Ride::from_record(id, &versioned.record))
            .filter(|ride| ride.is_booked_by(passenger_id))
            .collect())
    }

    /// Live ride list. The feed must be released (or dropped) when done.
    pub async fn subscribe_rides(&self) -> Result<RideFeed<S>, BookingError> {
        let subscription = self.bounded(self.store.subscribe_all(RIDES)).await?;
        Ok(RideFeed::new(Arc::clone(&self.store), subscription, None))
    }

    /// Live view of the rides `passenger_id` has booked.
    pub async fn subscribe_my_bookings(&self, passenger_id: &str) -> Result<RideFeed<S>, BookingError> {
        let passenger_id = required_passenger(passenger_id)?;
        let subscription = self.bounded(self.store.subscribe_all(RIDES)).await?;
        Ok(RideFeed::new(
            Arc::clone(&self.store),
            subscription,
            Some(passenger_id.to_string()),
        ))
    }

    /// Live view of a single ride; yields `None` while it does not exist.
    pub async fn watch_ride(&self, id: &str) -> Result<RideWatch<S>, BookingError> {
        let subscription = self.bounded(self.store.subscribe_one(RIDES, id)).await?;
        Ok(RideWatch::new(Arc::clone(&self.store), id, subscription))
    }

    /// Read the ride, compute its next state, and write it back only if nobody
    /// wrote in between. Lost races re-read and re-apply.
    async fn mutate<F>(&self, id: &str, op: &'static str, apply: F) -> Result<Ride, BookingError>
    where
        F: Fn(&Ride) -> Result<Ride, BookingError>,
    {
        for attempt in 1..=self.config.max_attempts {
            let current = self
                .bounded(self.store.get(RIDES, id))
                .await?
                .ok_or_else(|| BookingError::NotFound(id.to_string()))?;
            let ride = Ride::from_record(id, &current.record);
            let next = apply(&ride)?;

            match self
                .bounded(self.store.compare_and_set(
                    RIDES,
                    id,
                    Some(current.version),
                    next.to_record(),
                ))
                .await?
            {
                CasOutcome::Applied { .. } => return Ok(next),
                CasOutcome::Conflict { .. } => {
                    tracing::debug!(ride_id = %id, op, attempt, "Lost write race, retrying");
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }

        tracing::warn!(ride_id = %id, op, attempts = self.config.max_attempts, "Giving up on contended ride");
        Err(StoreError::Contention {
            collection: RIDES.to_string(),
            id: id.to_string(),
            attempts: self.config.max_attempts,
        }
        .into())
    }
}

fn required_passenger(passenger_id: &str) -> Result<&str, BookingError> {
    let trimmed = passenger_id.trim();
    if trimmed.is_empty() {
        return Err(BookingError::Validation("passenger id must not be empty".into()));
    }
    Ok(trimmed)
}
