use crate::core::{AppError, Result};
use crate::modules::bookings::models::{Booking, BookingStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Occupancy of a single seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    /// Held by a pending booking
    Reserved,
    /// Held by a confirmed booking
    Booked,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_number: String,
    pub state: SeatState,
}

/// Taken seats of one trip, derived from its active bookings
#[derive(Debug, Default)]
pub struct SeatLedger {
    taken: BTreeMap<u32, SeatState>,
}

impl SeatLedger {
    /// Build the ledger from a trip's bookings. Inactive bookings are ignored.
    pub fn from_bookings<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> Self {
        let mut taken = BTreeMap::new();
        for booking in bookings {
            let state = match booking.status {
                BookingStatus::Pending => SeatState::Reserved,
                BookingStatus::Confirmed => SeatState::Booked,
                _ => continue,
            };
            for seat in &booking.seat_numbers {
                if let Ok(number) = seat.parse::<u32>() {
                    taken.insert(number, state);
                }
            }
        }
        Self { taken }
    }

    pub fn taken_count(&self) -> usize {
        self.taken.len()
    }

    pub fn is_taken(&self, seat: u32) -> bool {
        self.taken.contains_key(&seat)
    }

    /// Requested seats already held by another active booking
    pub fn conflicts(&self, requested: &[u32]) -> Vec<String> {
        requested
            .iter()
            .filter(|seat| self.is_taken(**seat))
            .map(|seat| seat.to_string())
            .collect()
    }

    /// Seat map numbered `1..=total_seats`
    pub fn availability(&self, total_seats: u32) -> Vec<SeatView> {
        (1..=total_seats)
            .map(|seat| SeatView {
                seat_number: seat.to_string(),
                state: self
                    .taken
                    .get(&seat)
                    .copied()
                    .unwrap_or(SeatState::Available),
            })
            .collect()
    }
}

/// Validate and canonicalize a seat request.
///
/// Seat labels are numbers in `1..=total_seats`; `"07"` and `"7"` name the same
/// seat. The result is sorted and duplicate-free.
pub fn normalize_seat_request(
    seat_numbers: &[String],
    seats_booked: Option<u32>,
    total_seats: u32,
) -> Result<Vec<u32>> {
    if seat_numbers.is_empty() {
        return Err(AppError::validation("At least one seat must be requested"));
    }

    if let Some(expected) = seats_booked {
        if expected as usize != seat_numbers.len() {
            return Err(AppError::validation(format!(
                "seatsBooked ({}) does not match number of seat numbers ({})",
                expected,
                seat_numbers.len()
            )));
        }
    }

    let mut seats = BTreeSet::new();
    for raw in seat_numbers {
        let label = raw.trim();
        if label.is_empty() {
            return Err(AppError::validation("Seat number cannot be blank"));
        }

        let seat: u32 = label
            .parse()
            .map_err(|_| AppError::validation(format!("Invalid seat number '{}'", label)))?;
        if seat == 0 || seat > total_seats {
            return Err(AppError::validation(format!(
                "Seat {} is outside 1..={}",
                seat, total_seats
            )));
        }

        if !seats.insert(seat) {
            return Err(AppError::validation(format!(
                "Seat {} requested more than once",
                seat
            )));
        }
    }

    Ok(seats.into_iter().collect())
}
