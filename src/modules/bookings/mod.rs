pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Booking, BookingPaymentStatus, BookingStatus};
pub use repositories::BookingRepository;
pub use services::BookingService;
