use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::BookingError;
use crate::store::Record;

/// Shown for a date or time the driver did not fill in.
pub const UNSPECIFIED: &str = "N/A";

/// Largest seat count a ride may carry. Stored counts above it are clamped.
pub const MAX_SEATS: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RideStatus {
    Available,
    Booked,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Available => "Available",
            RideStatus::Booked => "Booked",
        }
    }
}

/// A ride is booked out exactly when no seat is left.
pub fn derive_status(seats_available: u32) -> RideStatus {
    if seats_available == 0 {
        RideStatus::Booked
    } else {
        RideStatus::Available
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub date: String,
    pub time: String,
    pub seats_available: u32,
    pub status: RideStatus,
    pub driver_name: String,
    pub driver_phone: String,
    pub booked_by: BTreeSet<String>,
}

/// Driver-supplied fields for creating or replacing a ride. `seats` is the
/// ride's total capacity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDetails {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    pub seats: u32,
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub driver_phone: String,
}

impl RideDetails {
    /// Trimmed copy, or a validation error naming the first bad field.
    pub fn validated(&self) -> Result<RideDetails, BookingError> {
        let origin = self.origin.trim();
        let destination = self.destination.trim();
        if origin.is_empty() {
            return Err(BookingError::Validation("origin must not be empty".into()));
        }
        if destination.is_empty() {
            return Err(BookingError::Validation("destination must not be empty".into()));
        }
        if self.seats == 0 {
            return Err(BookingError::Validation("seats must be greater than zero".into()));
        }
        if self.seats > MAX_SEATS {
            return Err(BookingError::Validation(format!(
                "seats must not exceed {}",
                MAX_SEATS
            )));
        }

        Ok(RideDetails {
            origin: origin.to_string(),
            destination: destination.to_string(),
            date: Some(or_unspecified(self.date.as_deref())),
            time: Some(or_unspecified(self.time.as_deref())),
            seats: self.seats,
            driver_name: self.driver_name.trim().to_string(),
            driver_phone: self.driver_phone.trim().to_string(),
        })
    }
}

fn or_unspecified(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNSPECIFIED.to_string(),
    }
}

impl Ride {
    /// Fresh ride with every seat free.
    pub fn new(id: String, details: RideDetails) -> Self {
        Self {
            id,
            origin: details.origin,
            destination: details.destination,
            date: or_unspecified(details.date.as_deref()),
            time: or_unspecified(details.time.as_deref()),
            seats_available: details.seats,
            status: derive_status(details.seats),
            driver_name: details.driver_name,
            driver_phone: details.driver_phone,
            booked_by: BTreeSet::new(),
        }
    }

    /// Seats free plus seats held.
    pub fn capacity(&self) -> u32 {
        self.seats_available.saturating_add(self.booked_by.len() as u32)
    }

    pub fn is_booked_by(&self, passenger_id: &str) -> bool {
        self.booked_by.contains(passenger_id)
    }

    /// Replace the driver-editable fields, keeping existing bookings.
    pub fn replaced(&self, details: RideDetails) -> Result<Ride, BookingError> {
        let held = self.booked_by.len() as u32;
        if details.seats < held {
            return Err(BookingError::Validation(format!(
                "seats cannot drop below the {} already booked",
                held
            )));
        }
        let seats_available = details.seats - held;

        Ok(Ride {
            id: self.id.clone(),
            origin: details.origin,
            destination: details.destination,
            date: or_unspecified(details.date.as_deref()),
            time: or_unspecified(details.time.as_deref()),
            seats_available,
            status: derive_status(seats_available),
            driver_name: details.driver_name,
            driver_phone: details.driver_phone,
            booked_by: self.booked_by.clone(),
        })
    }

    /// State after `passenger_id` takes one seat.
    pub fn booked(&self, passenger_id: &str) -> Result<Ride, BookingError> {
        if self.is_booked_by(passenger_id) {
            return Err(BookingError::AlreadyBooked {
                ride_id: self.id.clone(),
                passenger_id: passenger_id.to_string(),
            });
        }
        if self.seats_available == 0 {
            return Err(BookingError::NoSeatsAvailable(self.id.clone()));
        }

        let mut next = self.clone();
        next.seats_available -= 1;
        next.booked_by.insert(passenger_id.to_string());
        next.status = derive_status(next.seats_available);
        Ok(next)
    }

    /// State after `passenger_id` gives their seat back.
    pub fn cancelled(&self, passenger_id: &str) -> Result<Ride, BookingError> {
        if !self.is_booked_by(passenger_id) {
            return Err(BookingError::NotBooked {
                ride_id: self.id.clone(),
                passenger_id: passenger_id.to_string(),
            });
        }

        let mut next = self.clone();
        next.seats_available = self.seats_available.checked_add(1).ok_or_else(|| {
            BookingError::Validation(format!("ride {} has an impossible seat count", self.id))
        })?;
        next.booked_by.remove(passenger_id);
        next.status = derive_status(next.seats_available);
        Ok(next)
    }

    /// Storage layout under `rides/{id}`.
    pub fn to_record(&self) -> Record {
        let value = json!({
            "id": self.id,
            "origin": self.origin,
            "destination": self.destination,
            "date": self.date,
            "time": self.time,
            "seatsAvailable": self.seats_available,
            "status": self.status.as_str(),
            "driverName": self.driver_name,
            "driverPhone": self.driver_phone,
            "bookedBy": self.booked_by.iter().collect::<Vec<_>>(),
        });
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    /// Lenient decode of whatever is stored under `id`.
    ///
    /// Records written by older clients may lack fields or use other shapes
    /// (`bookedBy` as one string, or only a `seats` capacity that bookings
    /// never decremented). Nothing here fails; gaps get defaults and `status`
    /// is recomputed from the seats.
    pub fn from_record(id: &str, record: &Record) -> Ride {
        let booked_by: BTreeSet<String> = record.get("bookedBy").map(bookers).unwrap_or_default();
        let seats_available = match (record.get("seatsAvailable"), record.get("seats")) {
            (Some(free), _) => seat_count(free),
            // Legacy layout: `seats` is the capacity, bookings are held on top of it
            (None, Some(capacity)) => seat_count(capacity).saturating_sub(booked_by.len() as u32),
            (None, None) => 0,
        };

        let derived = derive_status(seats_available);
        let stored = record.get("status").and_then(Value::as_str);
        if let Some(stored) = stored {
            if stored != derived.as_str() {
                tracing::warn!(
                    ride_id = %id,
                    stored_status = %stored,
                    seats_available,
                    "Stored status disagrees with seat count, using derived status"
                );
            }
        }

        Ride {
            id: id.to_string(),
            origin: text(record, "origin"),
            destination: text(record, "destination"),
            date: or_unspecified(record.get("date").and_then(Value::as_str)),
            time: or_unspecified(record.get("time").and_then(Value::as_str)),
            seats_available,
            status: derived,
            driver_name: text(record, "driverName"),
            driver_phone: text(record, "driverPhone"),
            booked_by,
        }
    }
}

fn text(record: &Record, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn seat_count(value: &Value) -> u32 {
    let count = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    count.clamp(0, MAX_SEATS as i64) as u32
}

fn bookers(value: &Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(single) if !single.trim().is_empty() => {
            BTreeSet::from([single.trim().to_string()])
        }
        Value::Object(map) => map
            .iter()
            .filter(|(_, held)| !matches!(held, Value::Null | Value::Bool(false)))
            .map(|(passenger, _)| passenger.clone())
            .collect(),
        _ => BTreeSet::new(),
    }
}
