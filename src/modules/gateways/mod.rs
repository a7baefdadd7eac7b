pub mod models;
pub mod services;

pub use models::StkCallback;
pub use services::{
    CallbackVerifier, MpesaClient, PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome,
};
