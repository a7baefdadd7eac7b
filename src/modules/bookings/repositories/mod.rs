pub mod booking_repository;

pub use booking_repository::{BookingBuilder, BookingRepository, MySqlBookingRepository};
