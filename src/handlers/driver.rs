use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};

use crate::error::AppResult;
use crate::rides::{Ride, RideDetails};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Contact details default to the signed-in driver's own
fn with_driver_contact(mut details: RideDetails, claims: &Claims) -> RideDetails {
    if details.driver_name.trim().is_empty() {
        details.driver_name = claims.name.clone();
    }
    if details.driver_phone.trim().is_empty() {
        details.driver_phone = claims.phone.clone();
    }
    details
}

/// Offer a new ride
pub async fn add_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<RideDetails>, JsonRejection>,
) -> AppResult<Json<Ride>> {
    let Json(payload) = payload?;
    let ride = state
        .rides
        .add_ride(with_driver_contact(payload, &claims))
        .await?;
    Ok(Json(ride))
}

/// Replace a ride's details, keeping its bookings
pub async fn update_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<String>,
    payload: Result<Json<RideDetails>, JsonRejection>,
) -> AppResult<Json<Ride>> {
    let Json(payload) = payload?;
    let ride = state
        .rides
        .update_ride(&ride_id, with_driver_contact(payload, &claims))
        .await?;
    Ok(Json(ride))
}

/// Withdraw a ride
pub async fn delete_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.rides.delete_ride(&ride_id).await?;
    Ok(Json(serde_json::json!({ "message": "Ride deleted" })))
}
