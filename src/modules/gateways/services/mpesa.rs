use super::credentials::{
    basic_credentials, generate_password, CredentialCache, DEFAULT_TOKEN_TTL_SECS,
};
use super::gateway_trait::{PushOutcome, PushPaymentGateway, PushRequest, QueryOutcome};
use crate::config::MpesaConfig;
use crate::core::phone::mask_msisdn;
use crate::core::{money, AppError, Result};
use crate::modules::gateways::models::stk_callback::{outcome_for, result_code};
use crate::modules::payments::models::PaymentOutcome;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// Query answer while the customer has not responded yet
const STILL_PROCESSING_ERROR_CODE: &str = "500.001.1001";

/// Gateway limit on `TransactionDesc`
const MAX_DESCRIPTION_LEN: usize = 13;

/// M-Pesa Daraja client for Lipa na M-Pesa Online (STK push)
///
/// API Documentation: https://developer.safaricom.co.ke/APIs/MpesaExpressSimulate
pub struct MpesaClient {
    client: ClientWithMiddleware,
    push_client: ClientWithMiddleware,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
    credentials: CredentialCache,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds, sent as a string by some environments
    #[serde(default)]
    expires_in: Option<Value>,
}

#[derive(Debug, Serialize)]
struct StkPushBody<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'static str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Serialize)]
struct StkQueryBody<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: Value,
    #[serde(rename = "ResponseDescription", default)]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode", default)]
    result_code: Option<Value>,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
}

/// `errorMessage` (or `ResponseDescription`) of an error body
fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("errorMessage")
                .or_else(|| value.get("ResponseDescription"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

fn error_code(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("errorCode")?
        .as_str()
        .map(str::to_string)
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::gateway_unavailable(format!("M-Pesa {} failed: {}", context, err))
}

impl MpesaClient {
    /// Create a new M-Pesa client
    ///
    /// Transient failures (connect errors, timeouts, 5xx) on the token and
    /// query calls are retried with exponential backoff up to `max_retries`
    /// times. The STK push is sent once: a push whose response was lost may
    /// already have prompted the customer, and a retry would prompt them again
    /// under a CheckoutRequestID no payment records.
    pub fn new(config: &MpesaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let push_client = ClientBuilder::new(http).build();

        Ok(Self {
            client,
            push_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            shortcode: config.shortcode.clone(),
            passkey: config.passkey.clone(),
            callback_url: config.callback_url.clone(),
            credentials: CredentialCache::new(config.token_refresh_margin_secs),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = self.credentials.current(now).await {
            return Ok(token);
        }

        let response = self
            .client
            .get(format!("{}{}", self.base_url, OAUTH_PATH))
            .header(
                AUTHORIZATION,
                format!("Basic {}", basic_credentials(&self.consumer_key, &self.consumer_secret)),
            )
            .send()
            .await
            .map_err(|e| unavailable("token request", e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(unavailable("token request", format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::gateway(format!(
                "M-Pesa token request rejected - HTTP {} ({})",
                status.as_u16(),
                error_message(&body, status)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to parse M-Pesa token response: {}", e)))?;
        let expires_in = token
            .expires_in
            .as_ref()
            .and_then(result_code)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        tracing::debug!(expires_in, "Fetched M-Pesa access token");
        self.credentials
            .store(token.access_token.clone(), expires_in, now)
            .await;
        Ok(token.access_token)
    }

    /// POST with a bearer token; a 401 drops the cached token and retries once
    async fn post_authorized<T: Serialize + Sync>(
        &self,
        client: &ClientWithMiddleware,
        path: &str,
        body: &T,
    ) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..2 {
            let token = self.access_token().await?;
            let response = client
                .post(&url)
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .json(body)
                .send()
                .await
                .map_err(|e| unavailable(path, e))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::warn!(path, "M-Pesa rejected access token, refreshing");
                self.credentials.invalidate().await;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| unavailable(path, e))?;
            return Ok((status, text));
        }

        Err(AppError::gateway("M-Pesa rejected a freshly issued access token"))
    }
}

#[async_trait]
impl PushPaymentGateway for MpesaClient {
    async fn initiate_push(&self, request: PushRequest) -> Result<PushOutcome> {
        let amount = money::to_gateway_units(request.amount).ok_or_else(|| {
            AppError::validation(format!(
                "Amount {} cannot be charged in whole shillings",
                request.amount
            ))
        })?;
        let (password, timestamp) = generate_password(&self.shortcode, &self.passkey, Utc::now());

        let body = StkPushBody {
            business_short_code: &self.shortcode,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: &request.phone_number,
            party_b: &self.shortcode,
            phone_number: &request.phone_number,
            callback_url: &self.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: request.description.chars().take(MAX_DESCRIPTION_LEN).collect(),
        };

        let (status, text) = self.post_authorized(&self.push_client, STK_PUSH_PATH, &body).await?;
        if status.is_server_error() {
            return Err(unavailable(
                "STK push",
                format!("HTTP {} ({})", status.as_u16(), error_message(&text, status)),
            ));
        }
        if !status.is_success() {
            let reason = error_message(&text, status);
            tracing::warn!(
                reference = %request.account_reference,
                status = status.as_u16(),
                reason = %reason,
                "M-Pesa rejected STK push"
            );
            return Ok(PushOutcome::Rejected(reason));
        }

        let parsed: StkPushResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::gateway(format!("Failed to parse M-Pesa response: {}", e)))?;
        if result_code(&parsed.response_code) != Some(0) || parsed.checkout_request_id.is_empty() {
            return Ok(PushOutcome::Rejected(
                parsed
                    .response_description
                    .unwrap_or_else(|| format!("Response code {}", parsed.response_code)),
            ));
        }

        tracing::info!(
            reference = %request.account_reference,
            phone = %mask_msisdn(&request.phone_number),
            checkout_request_id = %parsed.checkout_request_id,
            "STK push accepted"
        );

        Ok(PushOutcome::Accepted {
            checkout_request_id: parsed.checkout_request_id,
            merchant_request_id: parsed.merchant_request_id,
            customer_message: parsed.customer_message,
        })
    }

    async fn query_status(&self, checkout_request_id: &str) -> Result<QueryOutcome> {
        let (password, timestamp) = generate_password(&self.shortcode, &self.passkey, Utc::now());
        let body = StkQueryBody {
            business_short_code: &self.shortcode,
            password,
            timestamp,
            checkout_request_id,
        };

        let (status, text) = self.post_authorized(&self.client, STK_QUERY_PATH, &body).await?;
        if !status.is_success() {
            if error_code(&text).as_deref() == Some(STILL_PROCESSING_ERROR_CODE) {
                return Ok(QueryOutcome::Pending);
            }
            let reason = format!("HTTP {} ({})", status.as_u16(), error_message(&text, status));
            return Err(if status.is_server_error() {
                unavailable("STK query", reason)
            } else {
                AppError::gateway(format!("M-Pesa STK query rejected: {}", reason))
            });
        }

        let parsed: StkQueryResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::gateway(format!("Failed to parse M-Pesa response: {}", e)))?;
        let Some(code) = parsed.result_code.as_ref().and_then(result_code) else {
            return Ok(QueryOutcome::Pending);
        };

        let description = parsed.result_desc.unwrap_or_default();
        Ok(match outcome_for(code, &description, None, None) {
            PaymentOutcome::Completed { receipt, .. } => QueryOutcome::Completed { receipt },
            PaymentOutcome::Cancelled(reason) => QueryOutcome::Cancelled(reason),
            PaymentOutcome::Failed(reason) => QueryOutcome::Failed(reason),
            PaymentOutcome::Expired => QueryOutcome::Pending,
        })
    }

    fn name(&self) -> &str {
        "mpesa"
    }
}
