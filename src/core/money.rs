use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// All fares, payments and refunds are Kenyan shillings
pub const CURRENCY_CODE: &str = "KES";

/// Decimal places accepted on inbound amounts
pub const SCALE: u32 = 2;

/// Validates that an amount is positive and carries at most two decimal places
pub fn validate_amount(amount: Decimal, field: &str) -> Result<(), String> {
    if amount <= Decimal::ZERO {
        return Err(format!("{} must be greater than zero", field));
    }

    if amount.normalize().scale() > SCALE {
        return Err(format!(
            "{} must have at most {} decimal places, got {}",
            field,
            SCALE,
            amount.scale()
        ));
    }

    Ok(())
}

/// Rounds to the currency scale
pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when two amounts differ by no more than `tolerance`
pub fn amounts_match(left: Decimal, right: Decimal, tolerance: Decimal) -> bool {
    (left - right).abs() <= tolerance
}

/// Converts to the whole-shilling integer the push-payment API expects
///
/// Returns `None` when the rounded value is not a positive integer.
pub fn to_gateway_units(amount: Decimal) -> Option<i64> {
    let whole = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    whole.to_i64().filter(|units| *units > 0)
}

/// Formats an amount for logs and customer-facing descriptions
pub fn format_amount(amount: Decimal) -> String {
    format!("{} {:.2}", CURRENCY_CODE, round(amount))
}
