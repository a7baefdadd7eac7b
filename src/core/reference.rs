use uuid::Uuid;

pub const BOOKING_PREFIX: &str = "BKG";
pub const PAYMENT_PREFIX: &str = "PAY";
pub const REFUND_PREFIX: &str = "RFD";

/// Human-facing reference such as `BKG-3F9A12C4`
pub fn generate_reference(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("{}-{}", prefix, suffix.to_uppercase())
}
