use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

/// East Africa Time offset (UTC+3), used by the M-Pesa API for timestamps
pub const EAT_OFFSET_SECS: i32 = 3 * 3600;

/// Timestamp layout for STK password generation and callback `TransactionDate`
pub const MPESA_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn nairobi_offset() -> FixedOffset {
    FixedOffset::east_opt(EAT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Convert UTC timestamp to Africa/Nairobi wall-clock time
pub fn utc_to_nairobi(utc_time: DateTime<Utc>) -> DateTime<FixedOffset> {
    utc_time.with_timezone(&nairobi_offset())
}

/// `YYYYMMDDHHMMSS` in Nairobi time
pub fn mpesa_timestamp(utc_time: DateTime<Utc>) -> String {
    utc_to_nairobi(utc_time)
        .format(MPESA_TIMESTAMP_FORMAT)
        .to_string()
}

/// Parse a Nairobi-local `YYYYMMDDHHMMSS` value back into UTC
pub fn parse_mpesa_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), MPESA_TIMESTAMP_FORMAT).ok()?;
    nairobi_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Format timestamp as ISO 8601 UTC for API responses
pub fn format_iso8601(utc_time: DateTime<Utc>) -> String {
    utc_time.to_rfc3339()
}
