use super::seat_ledger::{normalize_seat_request, SeatLedger, SeatView};
use crate::config::BookingConfig;
use crate::core::phone::normalize_msisdn;
use crate::core::{AppError, Result};
use crate::modules::bookings::models::{Booking, CancelOutcome, CreateBookingRequest, PassengerInfo};
use crate::modules::bookings::repositories::BookingRepository;
use crate::modules::trips::{Trip, TripRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Seat map of a trip
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailabilityView {
    pub trip_id: String,
    pub trip_code: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub booked_seats: u32,
    pub seats: Vec<SeatView>,
}

/// Booking manager
///
/// Seat reservations and cancellations go through [`BookingRepository`],
/// which serializes them per trip; this service owns the booking rules
/// evaluated against the locked snapshot.
pub struct BookingService {
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        config: BookingConfig,
    ) -> Self {
        Self {
            trips,
            bookings,
            config,
        }
    }

    /// Reserve seats on a trip
    ///
    /// # Errors
    /// * `ValidationError` - malformed seat list or passenger details
    /// * `TripNotFound` / `TripNotBookable`
    /// * `InsufficientSeats` - fewer seats left than requested
    /// * `SeatConflict` - a requested seat is held by another active booking
    pub async fn create_booking(&self, request: CreateBookingRequest) -> Result<Booking> {
        let passenger = validate_passenger(&request.passenger)?;
        // Shape checks need no trip; the range check runs under the trip lock.
        normalize_seat_request(&request.seat_numbers, request.seats_booked, u32::MAX)?;

        let deadline_hours = self.config.payment_deadline_hours;
        let build = |trip: &Trip, active: &[Booking]| -> Result<Booking> {
            if !trip.is_bookable() {
                return Err(AppError::TripNotBookable(format!(
                    "{} is {}",
                    trip.trip_code, trip.status
                )));
            }

            let seats =
                normalize_seat_request(&request.seat_numbers, request.seats_booked, trip.total_seats)?;
            let requested = seats.len() as u32;
            if trip.available_seats < requested {
                return Err(AppError::InsufficientSeats {
                    requested,
                    available: trip.available_seats,
                });
            }

            let conflicts = SeatLedger::from_bookings(active).conflicts(&seats);
            if !conflicts.is_empty() {
                return Err(AppError::SeatConflict(conflicts));
            }

            Ok(Booking::new_pending(
                &trip.id,
                trip.fare,
                seats.iter().map(u32::to_string).collect(),
                passenger.clone(),
                deadline_hours,
            ))
        };

        let booking = self.bookings.reserve_seats(&request.trip_id, &build).await?;

        tracing::info!(
            booking_id = %booking.id,
            reference = %booking.booking_reference,
            trip_id = %booking.trip_id,
            seats = ?booking.seat_numbers,
            total_fare = %booking.total_fare,
            "Booking created"
        );
        Ok(booking)
    }

    /// Cancel a booking and release its seats; cancelling twice is a no-op
    pub async fn cancel_booking(&self, booking_id: &str) -> Result<Booking> {
        match self.bookings.cancel(booking_id).await? {
            CancelOutcome::Cancelled(booking) => {
                tracing::info!(
                    booking_id = %booking.id,
                    trip_id = %booking.trip_id,
                    released = booking.seats_booked,
                    "Booking cancelled"
                );
                Ok(booking)
            }
            CancelOutcome::AlreadyCancelled(booking) => {
                tracing::debug!(booking_id = %booking.id, "Booking already cancelled");
                Ok(booking)
            }
        }
    }

    pub async fn get_booking(&self, booking_id: &str) -> Result<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking '{}'", booking_id)))
    }

    pub async fn seat_availability(&self, trip_id: &str) -> Result<SeatAvailabilityView> {
        let trip = self
            .trips
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::TripNotFound(trip_id.to_string()))?;
        let active = self.bookings.find_active_by_trip(trip_id).await?;

        Ok(SeatAvailabilityView {
            seats: SeatLedger::from_bookings(&active).availability(trip.total_seats),
            trip_id: trip.id,
            trip_code: trip.trip_code,
            total_seats: trip.total_seats,
            available_seats: trip.available_seats,
            booked_seats: trip.booked_seats,
        })
    }

    /// Cancel pending bookings past their payment deadline that have no open
    /// payment. Returns the number of bookings cancelled.
    pub async fn expire_overdue(&self, now: DateTime<Utc>, limit: u32) -> Result<usize> {
        let overdue = self.bookings.find_overdue(now, limit).await?;
        let mut cancelled = 0;

        for booking in overdue {
            match self.bookings.cancel_if_unpaid(&booking.id, now).await {
                Ok(Some(booking)) => {
                    tracing::info!(
                        booking_id = %booking.id,
                        deadline = %booking.payment_deadline,
                        released = booking.seats_booked,
                        "Unpaid booking cancelled after deadline"
                    );
                    cancelled += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(booking_id = %booking.id, error = %e, "Failed to cancel overdue booking");
                }
            }
        }

        Ok(cancelled)
    }
}

fn validate_passenger(passenger: &PassengerInfo) -> Result<PassengerInfo> {
    let name = passenger.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Passenger name is required"));
    }

    let phone = normalize_msisdn(&passenger.phone).map_err(AppError::Validation)?;
    let email = passenger
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());
    if let Some(email) = email {
        if !email.contains('@') {
            return Err(AppError::validation(format!("Invalid email address '{}'", email)));
        }
    }

    Ok(PassengerInfo {
        name: name.to_string(),
        phone,
        email: email.map(str::to_string),
    })
}
