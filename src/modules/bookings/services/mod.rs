pub mod booking_service;
pub mod seat_ledger;

pub use booking_service::{BookingService, SeatAvailabilityView};
pub use seat_ledger::{normalize_seat_request, SeatLedger, SeatState, SeatView};
