pub mod callback_auth;
pub mod credentials;
pub mod gateway_trait;
pub mod mpesa;

pub use callback_auth::CallbackVerifier;
pub use credentials::{generate_password, CredentialCache};
pub use gateway_trait::{PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome};
pub use mpesa::MpesaClient;
