use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks the shared token the gateway echoes back on callback URLs
#[derive(Clone)]
pub struct CallbackVerifier {
    token: Option<String>,
}

impl CallbackVerifier {
    /// `None` disables the check
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Constant-time comparison of `provided` against the configured token
    pub fn verify(&self, provided: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        let Some(provided) = provided else {
            return false;
        };

        let Ok(mut expected_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
            return false;
        };
        expected_mac.update(expected.as_bytes());

        let Ok(mut provided_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
            return false;
        };
        provided_mac.update(provided.as_bytes());
        let provided_tag = provided_mac.finalize().into_bytes();

        expected_mac.verify_slice(&provided_tag).is_ok()
    }
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
