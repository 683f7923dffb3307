use std::sync::Arc;

use tokio::sync::Barrier;
use tripshare_backend::{
    rides::{BookingConfig, BookingError, RideBookingService, RideDetails, RideStatus},
    store::MemoryStore,
};

fn last_seat_ride() -> RideDetails {
    RideDetails {
        origin: "Kisumu".into(),
        destination: "Kakamega".into(),
        date: None,
        time: None,
        seats: 1,
        driver_name: "Atieno".into(),
        driver_phone: "0701010101".into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_passengers_race_for_last_seat() {
    for _ in 0..25 {
        let rides = RideBookingService::new(Arc::new(MemoryStore::new()), BookingConfig::default());
        let id = rides.add_ride(last_seat_ride()).await.unwrap().id;
        let barrier = Arc::new(Barrier::new(2));

        let racers: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|passenger| {
                let rides = rides.clone();
                let id = id.clone();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    rides.book_ride(&id, passenger).await
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut sold_out = 0;
        for racer in racers {
            match racer.await.unwrap() {
                Ok(ride) => winners.push(ride),
                Err(BookingError::NoSeatsAvailable(_)) => sold_out += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(sold_out, 1);

        let ride = rides.get_ride(&id).await.unwrap();
        assert_eq!(ride.seats_available, 0);
        assert_eq!(ride.status, RideStatus::Booked);
        assert_eq!(ride.booked_by.len(), 1);
        assert_eq!(ride.booked_by, winners[0].booked_by);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_book_and_cancel_keep_accounting() {
    let rides = RideBookingService::new(Arc::new(MemoryStore::new()), BookingConfig {
        max_attempts: 50,
        ..BookingConfig::default()
    });
    let id = rides
        .add_ride(RideDetails { seats: 4, ..last_seat_ride() })
        .await
        .unwrap()
        .id;

    let mut tasks = Vec::new();
    for n in 0..4 {
        let rides = rides.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let passenger = format!("P{}", n);
            for _ in 0..5 {
                rides.book_ride(&id, &passenger).await?;
                rides.cancel_booking(&id, &passenger).await?;
            }
            rides.book_ride(&id, &passenger).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ride = rides.get_ride(&id).await.unwrap();
    assert_eq!(ride.seats_available, 0);
    assert_eq!(ride.booked_by.len(), 4);
    assert_eq!(ride.capacity(), 4);
}
