use arrayvec::ArrayString;
use chrono::{DateTime, NaiveDateTime, Utc};
use core::fmt::Write;
use rand::Rng;

/// Wire format for every timestamp the simulator emits.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
// Parsing accepts any number of fractional digits
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

pub const CORRELATION_ID_LEN: usize = 40;

/// Opaque token linking a command request to its acknowledgment.
pub type CorrelationId = ArrayString<CORRELATION_ID_LEN>;

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(value))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_iso() -> String {
    format_timestamp(&Utc::now())
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT).map(|naive| naive.and_utc())
}

/// Sortable correlation id: `<unix millis>-<4 random digits>`.
pub fn gen_correlation_id<R: Rng + ?Sized>(now: &DateTime<Utc>, rng: &mut R) -> CorrelationId {
    let mut id = CorrelationId::new();
    // 13 + 1 + 4 digits always fits in CORRELATION_ID_LEN
    let _ = write!(id, "{}-{}", now.timestamp_millis(), rng.gen_range(1000..=9999));
    id
}

/// Serde adapter for `DateTime<Utc>` in the fixed microsecond wire format.
pub mod iso_micros {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text).map_err(de::Error::custom)
    }
}
