/// Normalizes a Kenyan mobile number to the `2547XXXXXXXX` / `2541XXXXXXXX`
/// form the push-payment API expects.
///
/// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `+2547XXXXXXXX`, `2547XXXXXXXX` and the
/// bare nine-digit subscriber number. Spaces and dashes are ignored.
pub fn normalize_msisdn(raw: &str) -> Result<String, String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Invalid phone number: '{}'", raw));
    }

    let normalized = match digits.len() {
        12 if digits.starts_with("254") => digits.to_string(),
        10 if digits.starts_with('0') => format!("254{}", &digits[1..]),
        9 => format!("254{}", digits),
        _ => return Err(format!("Invalid phone number: '{}'", raw)),
    };

    if !(normalized.starts_with("2547") || normalized.starts_with("2541")) {
        return Err(format!(
            "Phone number '{}' is not a mobile money number",
            raw
        ));
    }

    Ok(normalized)
}

/// Masks all but the last three digits for logs
pub fn mask_msisdn(msisdn: &str) -> String {
    let visible = msisdn.len().saturating_sub(3);
    msisdn
        .chars()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}
