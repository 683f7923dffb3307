use std::sync::Arc;

use super::service::RideBookingService;
use super::{BookingError, Ride};
use crate::store::{
    CollectionSnapshot, KeyValueStore, Subscription, SubscriptionHandle, Versioned,
};

/// Live ride list backed by a store subscription.
///
/// The subscription is released by [`RideFeed::release`] or when the feed is
/// dropped, whichever comes first.
pub struct RideFeed<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    subscription: Subscription<CollectionSnapshot>,
    passenger: Option<String>,
    released: bool,
}

impl<S: KeyValueStore + ?Sized> RideFeed<S> {
    pub(crate) fn new(
        store: Arc<S>,
        subscription: Subscription<CollectionSnapshot>,
        passenger: Option<String>,
    ) -> Self {
        Self {
            store,
            subscription,
            passenger,
            released: false,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.subscription.handle()
    }

    /// Next snapshot. `None` once the feed has been released.
    pub async fn next(&mut self) -> Option<Result<Vec<Ride>, BookingError>> {
        let delivery = self.subscription.next().await?;
        Some(delivery.map(|snapshot| self.decode(&snapshot)).map_err(BookingError::from))
    }

    fn decode(&self, snapshot: &CollectionSnapshot) -> Vec<Ride> {
        snapshot
            .iter()
            .map(|(id, versioned)| Ride::from_record(id, &versioned.record))
            .filter(|ride| match &self.passenger {
                Some(passenger) => ride.is_booked_by(passenger),
                None => true,
            })
            .collect()
    }

    pub fn release(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if !self.released {
            self.released = true;
            self.store.unsubscribe(self.subscription.handle());
        }
    }
}

impl<S: KeyValueStore + ?Sized> Drop for RideFeed<S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Live view of one ride.
pub struct RideWatch<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    ride_id: String,
    subscription: Subscription<Option<Versioned>>,
    released: bool,
}

impl<S: KeyValueStore + ?Sized> RideWatch<S> {
    pub(crate) fn new(store: Arc<S>, ride_id: &str, subscription: Subscription<Option<Versioned>>) -> Self {
        Self {
            store,
            ride_id: ride_id.to_string(),
            subscription,
            released: false,
        }
    }

    pub fn ride_id(&self) -> &str {
        &self.ride_id
    }

    /// Next state of the ride, `Ok(None)` while it does not exist.
    pub async fn next(&mut self) -> Option<Result<Option<Ride>, BookingError>> {
        let delivery = self.subscription.next().await?;
        Some(
            delivery
                .map(|current| current.map(|v| Ride::from_record(&self.ride_id, &v.record)))
                .map_err(BookingError::from),
        )
    }

    pub fn release(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if !self.released {
            self.released = true;
            self.store.unsubscribe(self.subscription.handle());
        }
    }
}

impl<S: KeyValueStore + ?Sized> Drop for RideWatch<S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Holder for the one ride-list feed a screen keeps open.
///
/// Subscribing again releases the previous feed first, so a consumer never
/// receives the same change twice.
pub struct LiveRides<S: KeyValueStore + ?Sized> {
    service: RideBookingService<S>,
    feed: Option<RideFeed<S>>,
    rides: Vec<Ride>,
}

impl<S: KeyValueStore + ?Sized> LiveRides<S> {
    pub fn new(service: RideBookingService<S>) -> Self {
        Self {
            service,
            feed: None,
            rides: Vec::new(),
        }
    }

    pub async fn subscribe(&mut self) -> Result<(), BookingError> {
        self.release();
        self.feed = Some(self.service.subscribe_rides().await?);
        Ok(())
    }

    pub fn is_subscribed(&self) -> bool {
        self.feed.is_some()
    }

    /// Wait for the next snapshot and keep it as the current list.
    pub async fn next(&mut self) -> Option<Result<&[Ride], BookingError>> {
        let feed = self.feed.as_mut()?;
        match feed.next().await? {
            Ok(rides) => {
                self.rides = rides;
                Some(Ok(self.rides.as_slice()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ride feed delivered an error");
                Some(Err(e))
            }
        }
    }

    /// Last snapshot received.
    pub fn rides(&self) -> &[Ride] {
        &self.rides
    }

    pub fn release(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.release();
        }
    }
}
