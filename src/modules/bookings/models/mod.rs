pub mod booking;

pub use booking::{
    Booking, BookingPaymentStatus, BookingStatus, CancelOutcome, CreateBookingRequest,
    PassengerInfo,
};
