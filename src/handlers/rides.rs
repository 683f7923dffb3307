use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};

use crate::error::AppResult;
use crate::rides::Ride;
use crate::AppState;

/// List every ride
pub async fn list_rides(State(state): State<AppState>) -> AppResult<Json<Vec<Ride>>> {
    Ok(Json(state.rides.list_rides().await?))
}

/// Get ride details
pub async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<String>,
) -> AppResult<Json<Ride>> {
    Ok(Json(state.rides.get_ride(&ride_id).await?))
}

/// Push the ride list on every change as server-sent events.
///
/// Each `rides` event carries the full list; a store failure is sent as an
/// `error` event. The subscription is released when the client disconnects.
pub async fn stream_rides(
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let feed = state.rides.subscribe_rides().await?;
    tracing::debug!(handle = ?feed.handle(), "Ride stream opened");

    let events = stream::unfold(feed, |mut feed| async move {
        let event = match feed.next().await? {
            Ok(rides) => Event::default()
                .event("rides")
                .json_data(&rides)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Some((Ok(event), feed))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
