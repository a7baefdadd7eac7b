use crate::core::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trip lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    /// Open for booking
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripStatus::Scheduled => write!(f, "scheduled"),
            TripStatus::InProgress => write!(f, "in_progress"),
            TripStatus::Completed => write!(f, "completed"),
            TripStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TripStatus::Scheduled),
            "in_progress" => Ok(TripStatus::InProgress),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            _ => Err(format!("Invalid trip status: {}", s)),
        }
    }
}

/// Scheduled trip with its seat capacity counters
///
/// Counters are only mutated through [`Trip::reserve`] and [`Trip::release`],
/// which keep `available_seats + booked_seats == total_seats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub trip_code: String,
    pub fare: Decimal,
    pub total_seats: u32,
    pub available_seats: u32,
    pub booked_seats: u32,
    pub status: TripStatus,
    pub scheduled_departure: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// Create a new scheduled trip with every seat available
    pub fn new(
        trip_code: impl Into<String>,
        fare: Decimal,
        total_seats: u32,
        scheduled_departure: DateTime<Utc>,
    ) -> Result<Self> {
        if total_seats == 0 {
            return Err(AppError::validation("Trip must have at least one seat"));
        }
        if fare <= Decimal::ZERO {
            return Err(AppError::validation("Trip fare must be greater than zero"));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            trip_code: trip_code.into(),
            fare,
            total_seats,
            available_seats: total_seats,
            booked_seats: 0,
            status: TripStatus::Scheduled,
            scheduled_departure,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_bookable(&self) -> bool {
        self.status == TripStatus::Scheduled
    }

    /// Move `seats` from available to booked
    pub fn reserve(&mut self, seats: u32) -> Result<()> {
        let available = self
            .available_seats
            .checked_sub(seats)
            .ok_or(AppError::InsufficientSeats {
                requested: seats,
                available: self.available_seats,
            })?;
        self.available_seats = available;
        self.booked_seats += seats;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Return `seats` to the available pool, never exceeding capacity
    pub fn release(&mut self, seats: u32) {
        let released = seats.min(self.booked_seats);
        self.booked_seats -= released;
        self.available_seats = (self.available_seats + released).min(self.total_seats);
        self.updated_at = Utc::now();
    }

    pub fn counters_consistent(&self) -> bool {
        self.available_seats + self.booked_seats == self.total_seats
    }
}
