pub mod models;
pub mod repositories;

pub use models::{Trip, TripStatus};
pub use repositories::TripRepository;
