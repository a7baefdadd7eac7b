//! Fleetpay booking and payment engine
//!
//! Seat reservations with no double-selling, M-Pesa STK push payments with
//! an idempotent callback ledger, and refunds with an approval threshold.

pub mod app;
pub mod config;
pub mod core;
pub mod memory_store;
pub mod middleware;
pub mod modules;

pub use app::{AppState, Repositories};
pub use memory_store::MemoryStore;
pub use modules::{bookings, gateways, payments, refunds, trips};
