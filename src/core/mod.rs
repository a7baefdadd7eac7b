pub mod error;
pub mod money;
pub mod phone;
pub mod reference;
pub mod timezone;

pub use error::{AppError, Result};
