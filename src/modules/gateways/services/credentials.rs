use crate::core::timezone::mpesa_timestamp;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Token lifetime used when the gateway omits `expires_in` or sends one out of range
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3599;

/// Longest token lifetime honoured
const MAX_TOKEN_TTL_SECS: i64 = 86_400;

/// STK password and the timestamp it was generated for
///
/// `base64(shortcode + passkey + timestamp)`, timestamp in East Africa Time.
pub fn generate_password(shortcode: &str, passkey: &str, now: DateTime<Utc>) -> (String, String) {
    let timestamp = mpesa_timestamp(now);
    let password = STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp));
    (password, timestamp)
}

/// `Authorization: Basic` value for the OAuth endpoint
pub fn basic_credentials(consumer_key: &str, consumer_secret: &str) -> String {
    STANDARD.encode(format!("{}:{}", consumer_key, consumer_secret))
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// OAuth access token cache
///
/// A token is reused until `refresh_margin` before its expiry.
#[derive(Debug)]
pub struct CredentialCache {
    token: Mutex<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl CredentialCache {
    pub fn new(refresh_margin_secs: u64) -> Self {
        Self {
            token: Mutex::new(None),
            refresh_margin: Duration::seconds(refresh_margin_secs as i64),
        }
    }

    /// Cached token if still fresh at `now`
    pub async fn current(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.token.lock().await;
        token
            .as_ref()
            .filter(|cached| now + self.refresh_margin < cached.expires_at)
            .map(|cached| cached.access_token.clone())
    }

    pub async fn store(&self, access_token: String, expires_in_secs: i64, now: DateTime<Utc>) {
        let ttl = token_ttl(expires_in_secs);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(now);
        let mut token = self.token.lock().await;
        *token = Some(CachedToken {
            access_token,
            expires_at,
        });
    }

    pub async fn invalidate(&self) {
        self.token.lock().await.take();
    }
}

/// `expires_in` as a lifetime, falling back to the default outside `1..=86400`
fn token_ttl(expires_in_secs: i64) -> Duration {
    let secs = if (1..=MAX_TOKEN_TTL_SECS).contains(&expires_in_secs) {
        expires_in_secs
    } else {
        tracing::warn!(expires_in_secs, "Ignoring out-of-range M-Pesa token lifetime");
        DEFAULT_TOKEN_TTL_SECS
    };
    Duration::seconds(secs)
}
