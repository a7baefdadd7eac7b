pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{RefundStatus, RefundTransaction};
pub use repositories::RefundRepository;
pub use services::RefundService;
