use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::error::AppResult;
use crate::rides::Ride;
use crate::utils::jwt::Claims;
use crate::AppState;

/// Take a seat on a ride
pub async fn book_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<String>,
) -> AppResult<Json<Ride>> {
    let ride = state
        .rides
        .book_ride(&ride_id, &claims.passenger_id())
        .await?;
    Ok(Json(ride))
}

/// Give a seat back
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<String>,
) -> AppResult<Json<Ride>> {
    let ride = state
        .rides
        .cancel_booking(&ride_id, &claims.passenger_id())
        .await?;
    Ok(Json(ride))
}

/// Rides the caller holds a seat on
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<Ride>>> {
    Ok(Json(state.rides.list_my_bookings(&claims.passenger_id()).await?))
}
