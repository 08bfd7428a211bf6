//! Lenient deserializers for server payloads
//!
//! The server mixes number/string encodings and emits naive ISO-8601
//! timestamps (no offset), so the models accept all of them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de;

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one interpreted as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Deserialize a required timestamp
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Timestamp;

    impl<'de> de::Visitor<'de> for Timestamp {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an ISO-8601 timestamp")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<DateTime<Utc>, E> {
            parse_timestamp(v).ok_or_else(|| E::custom(format!("invalid timestamp: {}", v)))
        }
    }

    deserializer.deserialize_str(Timestamp)
}

/// Deserialize an optional timestamp; null, missing, or unparsable become None
pub(crate) fn deserialize_timestamp_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <Option<String> as serde::Deserialize>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Deserialize an f64 that may arrive as a number, string, or null
pub(crate) fn deserialize_f64_lenient<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct F64Lenient;

    impl<'de> de::Visitor<'de> for F64Lenient {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number, string, or null")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<f64, E> {
            v.parse::<f64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> std::result::Result<f64, E> {
            Ok(0.0)
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<f64, E> {
            Ok(0.0)
        }
    }

    deserializer.deserialize_any(F64Lenient)
}

/// Deserialize a value that may be a string or number into u32
pub(crate) fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = u32;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u32, E> {
            Ok(v as u32)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u32, E> {
            Ok(v as u32)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u32, E> {
            v.parse::<u32>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Identifiers arrive as integers from some endpoints and strings from others
pub(crate) fn deserialize_id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct IdString;

    impl<'de> de::Visitor<'de> for IdString {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer id")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdString)
}
