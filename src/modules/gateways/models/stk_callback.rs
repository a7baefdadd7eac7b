use crate::core::timezone::parse_mpesa_timestamp;
use crate::modules::payments::models::PaymentOutcome;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Result code for a successful payment
pub const RESULT_SUCCESS: i64 = 0;

/// Result code when the customer dismisses the prompt
pub const RESULT_CANCELLED_BY_USER: i64 = 1032;

/// Acknowledgement body returned to the gateway for every callback
pub fn callback_ack() -> Value {
    serde_json::json!({ "ResultCode": 0, "ResultDesc": "Success" })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Body")]
    body: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    #[serde(rename = "stkCallback")]
    stk_callback: RawStkCallback,
}

#[derive(Debug, Deserialize)]
struct RawStkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode")]
    result_code: Value,
    #[serde(rename = "ResultDesc", default)]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<Value>,
}

/// Result code from a JSON number or numeric string
pub fn result_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validated STK push result callback
#[derive(Debug, Clone, PartialEq)]
pub struct StkCallback {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: String,
    pub receipt: Option<String>,
    pub amount: Option<Decimal>,
    pub phone_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
}

impl StkCallback {
    /// Parse the `Body.stkCallback` envelope.
    ///
    /// Fails when the envelope is malformed, the `CheckoutRequestID` is
    /// missing, or the result code is not numeric.
    pub fn parse(payload: &Value) -> Result<Self, String> {
        let envelope: Envelope = serde_json::from_value(payload.clone())
            .map_err(|e| format!("Malformed STK callback: {}", e))?;
        let raw = envelope.body.stk_callback;

        let checkout_request_id = raw
            .checkout_request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| "STK callback has no CheckoutRequestID".to_string())?;
        let result_code = result_code(&raw.result_code)
            .ok_or_else(|| format!("Non-numeric ResultCode: {}", raw.result_code))?;

        let mut callback = StkCallback {
            merchant_request_id: raw.merchant_request_id,
            checkout_request_id,
            result_code,
            result_desc: raw.result_desc.unwrap_or_default(),
            receipt: None,
            amount: None,
            phone_number: None,
            transaction_date: None,
        };

        let items = raw.callback_metadata.map(|m| m.items).unwrap_or_default();
        for item in items {
            let Some(value) = item.value.as_ref().and_then(value_as_string) else {
                continue;
            };
            match item.name.as_str() {
                "MpesaReceiptNumber" => callback.receipt = Some(value),
                "Amount" => callback.amount = Decimal::from_str(&value).ok(),
                "PhoneNumber" => callback.phone_number = Some(value),
                "TransactionDate" => callback.transaction_date = parse_mpesa_timestamp(&value),
                _ => {}
            }
        }

        Ok(callback)
    }

    /// Best-effort `CheckoutRequestID` from a payload that failed to parse
    pub fn checkout_request_id_of(payload: &Value) -> Option<String> {
        payload
            .pointer("/Body/stkCallback/CheckoutRequestID")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
    }

    pub fn outcome(&self) -> PaymentOutcome {
        outcome_for(self.result_code, &self.result_desc, self.receipt.clone(), self.transaction_date)
    }
}

/// Map a gateway result code to the payment outcome
pub fn outcome_for(
    code: i64,
    description: &str,
    receipt: Option<String>,
    transaction_date: Option<DateTime<Utc>>,
) -> PaymentOutcome {
    match code {
        RESULT_SUCCESS => PaymentOutcome::Completed {
            receipt,
            transaction_date,
        },
        RESULT_CANCELLED_BY_USER => PaymentOutcome::Cancelled(non_empty(description, code)),
        _ => PaymentOutcome::Failed(non_empty(description, code)),
    }
}

fn non_empty(description: &str, code: i64) -> String {
    if description.trim().is_empty() {
        format!("Gateway result code {}", code)
    } else {
        description.to_string()
    }
}
