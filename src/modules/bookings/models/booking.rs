use crate::core::reference::{generate_reference, BOOKING_PREFIX};
use crate::core::{money, AppError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Seats held, awaiting payment
    #[default]
    Pending,
    /// Paid
    Confirmed,
    Cancelled,
    /// Trip done
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Active bookings hold their seats
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::NoShow => write!(f, "no_show"),
        }
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "no_show" => Ok(BookingStatus::NoShow),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// Payment state as seen from the booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    #[default]
    Pending,
    Completed,
    Refunded,
}

impl std::fmt::Display for BookingPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingPaymentStatus::Pending => write!(f, "pending"),
            BookingPaymentStatus::Completed => write!(f, "completed"),
            BookingPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for BookingPaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingPaymentStatus::Pending),
            "completed" => Ok(BookingPaymentStatus::Completed),
            "refunded" => Ok(BookingPaymentStatus::Refunded),
            _ => Err(format!("Invalid booking payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerInfo {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Seat reservation on a trip
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub booking_reference: String,
    pub trip_id: String,
    pub passenger_name: String,
    /// Normalized `2547XXXXXXXX` form
    pub passenger_phone: String,
    pub passenger_email: Option<String>,
    pub seats_booked: u32,
    /// Ordered by seat number
    pub seat_numbers: Vec<String>,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub total_fare: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub payment_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Create a pending booking for already-validated seats
    ///
    /// # Arguments
    /// * `trip_id` - Trip being booked
    /// * `fare` - Per-seat fare of the trip
    /// * `seat_numbers` - Normalized, conflict-free seat labels
    /// * `passenger` - Passenger details with a normalized phone number
    /// * `payment_deadline_hours` - Hours until an unpaid booking lapses
    ///
    /// # Returns
    /// * `Booking` with `total_fare = fare × seats` and nothing paid
    pub fn new_pending(
        trip_id: &str,
        fare: Decimal,
        seat_numbers: Vec<String>,
        passenger: PassengerInfo,
        payment_deadline_hours: i64,
    ) -> Self {
        let now = Utc::now();
        let seats_booked = seat_numbers.len() as u32;
        let total_fare = money::round(fare * Decimal::from(seats_booked));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            booking_reference: generate_reference(BOOKING_PREFIX),
            trip_id: trip_id.to_string(),
            passenger_name: passenger.name,
            passenger_phone: passenger.phone,
            passenger_email: passenger.email,
            seats_booked,
            seat_numbers,
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Pending,
            total_fare,
            amount_paid: Decimal::ZERO,
            amount_due: total_fare,
            payment_deadline: now + Duration::hours(payment_deadline_hours),
            created_at: now,
            updated_at: now,
        }
    }

    /// A payment may be started for this booking
    pub fn is_payable(&self) -> bool {
        self.status.is_active() && self.payment_status == BookingPaymentStatus::Pending
    }

    /// Apply a completed payment.
    ///
    /// Returns `false` without touching the booking when it is no longer active;
    /// a late payment never resurrects a cancelled booking.
    pub fn record_payment(&mut self, amount: Decimal) -> bool {
        if !self.status.is_active() {
            return false;
        }

        self.amount_paid = money::round(self.amount_paid + amount);
        self.amount_due = (self.total_fare - self.amount_paid).max(Decimal::ZERO);
        self.payment_status = BookingPaymentStatus::Completed;
        self.status = BookingStatus::Confirmed;
        self.updated_at = Utc::now();
        true
    }

    /// The booking's payment has been fully refunded
    pub fn mark_refunded(&mut self) {
        self.payment_status = BookingPaymentStatus::Refunded;
        self.updated_at = Utc::now();
    }

    /// Transition to cancelled.
    ///
    /// Returns `Ok(false)` when already cancelled.
    pub fn cancel(&mut self) -> Result<bool> {
        match self.status {
            BookingStatus::Cancelled => Ok(false),
            BookingStatus::Pending | BookingStatus::Confirmed => {
                self.status = BookingStatus::Cancelled;
                self.updated_at = Utc::now();
                Ok(true)
            }
            other => Err(AppError::conflict(format!(
                "Booking '{}' cannot be cancelled from status '{}'",
                self.booking_reference, other
            ))),
        }
    }

    /// Pending, unpaid and past its payment deadline
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.payment_status == BookingPaymentStatus::Pending
            && self.payment_deadline < now
    }
}

/// Request body for `POST /bookings`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub trip_id: String,
    pub seat_numbers: Vec<String>,
    /// Optional explicit count; must equal the number of seats when present
    pub seats_booked: Option<u32>,
    pub passenger: PassengerInfo,
}

/// Outcome of a cancellation request
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(Booking),
    AlreadyCancelled(Booking),
}

impl CancelOutcome {
    pub fn into_booking(self) -> Booking {
        match self {
            CancelOutcome::Cancelled(booking) | CancelOutcome::AlreadyCancelled(booking) => booking,
        }
    }
}
