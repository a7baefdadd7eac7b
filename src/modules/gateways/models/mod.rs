pub mod stk_callback;

pub use stk_callback::{callback_ack, outcome_for, StkCallback};
