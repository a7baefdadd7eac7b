pub mod trip_repository;

pub use trip_repository::{MySqlTripRepository, TripRepository};
