//! Wire-value adapters
//!
//! Domain values whose JSON form is a string: a UTC timestamp in RFC 3339
//! and a Go-style duration (`"1h30m0s"`). Both report the `string` kind to
//! the schema reflector instead of being described as records.

use std::fmt;
use std::ops::Deref;
use std::time::Duration as StdDuration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::schema::{Describe, Shape};
use crate::validation::{Presence, Validate, ValidationErrors};

/// A UTC timestamp that travels as an RFC 3339 string.
///
/// Serializes with seconds precision (`2024-05-01T12:00:00Z`). Parsing
/// accepts fractional seconds and any offset; `null` and `""` give the zero
/// value, the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(pub DateTime<Utc>);

impl Time {
    pub fn now() -> Self {
        Time(Utc::now())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == DateTime::<Utc>::default()
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(value: DateTime<Utc>) -> Self {
        Time(value)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct TimeVisitor;

impl<'de> Visitor<'de> for TimeVisitor {
    type Value = Time;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("string in RFC3339 format")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Time, E> {
        if value.is_empty() {
            return Ok(Time::default());
        }
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| Time(parsed.with_timezone(&Utc)))
            .map_err(|e| E::custom(format!("invalid time '{}': {}", value, e)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Time, E> {
        Ok(Time::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Time, E> {
        Ok(Time::default())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Time, E> {
        Err(invalid_time())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Time, E> {
        Err(invalid_time())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Time, E> {
        Err(invalid_time())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Time, E> {
        Err(invalid_time())
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, _: A) -> Result<Time, A::Error> {
        Err(invalid_time())
    }

    fn visit_map<A: de::MapAccess<'de>>(self, _: A) -> Result<Time, A::Error> {
        Err(invalid_time())
    }
}

fn invalid_time<E: de::Error>() -> E {
    E::custom("invalid time: expected string in RFC3339 format")
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimeVisitor)
    }
}

impl Describe for Time {
    fn shape() -> Shape {
        Shape::Override {
            name: "Time",
            package: module_path!(),
            kind: "string",
        }
    }
}

impl Validate for Time {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl Presence for Time {
    fn is_present(&self) -> bool {
        !self.is_zero()
    }

    fn observed(&self) -> Option<Value> {
        Some(Value::String(self.to_string()))
    }
}

/// Failure to parse a duration string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration: empty string")]
    Empty,

    #[error("invalid duration '{0}': negative durations are not supported")]
    Negative(String),

    #[error("invalid duration '{input}': {reason}")]
    Invalid { input: String, reason: String },
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A span of time that travels as a Go-style duration string.
///
/// Serializes as e.g. `"1h30m0s"`, `"1.5s"` or `"250ms"`. Deserializes from
/// a string of whole-number terms (parsed with `humantime`) or from a number
/// of nanoseconds; `null` is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(pub StdDuration);

impl Duration {
    pub fn into_inner(self) -> StdDuration {
        self.0
    }

    /// Parse `72h3m`, `300ms`, `2us`, `1h 30m` and friends.
    ///
    /// Each term is a whole number with a unit. Sub-unit precision travels as
    /// a JSON number of nanoseconds instead.
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        parse_duration(input).map(Duration)
    }
}

impl Deref for Duration {
    type Target = StdDuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<StdDuration> for Duration {
    fn from(value: StdDuration) -> Self {
        Duration(value)
    }
}

impl std::str::FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Duration::parse(s)
    }
}

/// `value / unit` with the fraction trimmed of trailing zeros
fn fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let rest = value % unit;
    if rest == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{:0width$}", rest, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }
        if nanos < 1_000 {
            return write!(f, "{}ns", nanos);
        }
        if nanos < 1_000_000 {
            return write!(f, "{}µs", fraction(nanos, 1_000));
        }
        if nanos < NANOS_PER_SEC {
            return write!(f, "{}ms", fraction(nanos, 1_000_000));
        }

        let total_secs = nanos / NANOS_PER_SEC;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = fraction((total_secs % 60) * NANOS_PER_SEC + nanos % NANOS_PER_SEC, NANOS_PER_SEC);
        if hours > 0 {
            write!(f, "{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            write!(f, "{}m{}s", minutes, seconds)
        } else {
            write!(f, "{}s", seconds)
        }
    }
}

fn parse_duration(input: &str) -> Result<StdDuration, DurationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(DurationError::Empty);
    }
    if let Some(magnitude) = text.strip_prefix('-') {
        // "-0s" is still zero
        return match parse_duration(magnitude) {
            Ok(value) if value.is_zero() => Ok(StdDuration::ZERO),
            _ => Err(DurationError::Negative(input.to_string())),
        };
    }
    let text = text.strip_prefix('+').unwrap_or(text);
    if text == "0" {
        return Ok(StdDuration::ZERO);
    }

    let normalized = text.replace(['µ', 'μ'], "u");
    humantime::parse_duration(&normalized).map_err(|e| DurationError::Invalid {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration string or a number of nanoseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        Duration::parse(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration(StdDuration::from_nanos(value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(|nanos| Duration(StdDuration::from_nanos(nanos)))
            .map_err(|_| E::custom("invalid duration: negative durations are not supported"))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Duration, E> {
        if !value.is_finite() || value < 0.0 || value > u64::MAX as f64 {
            return Err(E::custom(format!("invalid duration: {} nanoseconds", value)));
        }
        Ok(Duration(StdDuration::from_nanos(value.trunc() as u64)))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Duration, E> {
        Ok(Duration::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Duration, E> {
        Ok(Duration::default())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}

impl Describe for Duration {
    fn shape() -> Shape {
        Shape::Override {
            name: "Duration",
            package: module_path!(),
            kind: "string",
        }
    }
}

impl Validate for Duration {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl Presence for Duration {
    fn is_present(&self) -> bool {
        !self.0.is_zero()
    }

    fn observed(&self) -> Option<Value> {
        Some(Value::String(self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{from_value, json, to_value};

    #[test]
    fn test_time_serializes_seconds_precision() {
        let time = Time(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());
        assert_eq!(to_value(time).unwrap(), json!("2024-05-01T12:30:00Z"));
    }

    #[test]
    fn test_time_accepts_fraction_and_offset() {
        let time: Time = from_value(json!("2024-05-01T14:30:00.123456789+02:00")).unwrap();
        assert_eq!(time.to_string(), "2024-05-01T12:30:00Z");
        assert_eq!(time.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_time_null_and_empty_are_zero() {
        assert!(from_value::<Time>(Value::Null).unwrap().is_zero());
        assert!(from_value::<Time>(json!("")).unwrap().is_zero());
    }

    #[test]
    fn test_time_rejects_non_strings() {
        let error = from_value::<Time>(json!(1714563000)).unwrap_err();
        assert!(
            error
                .to_string()
                .contains("invalid time: expected string in RFC3339 format")
        );
        assert!(from_value::<Time>(json!("yesterday")).is_err());
    }

    #[test]
    fn test_duration_display() {
        let cases = [
            (StdDuration::ZERO, "0s"),
            (StdDuration::from_nanos(42), "42ns"),
            (StdDuration::from_nanos(1_500), "1.5µs"),
            (StdDuration::from_millis(250), "250ms"),
            (StdDuration::from_millis(1_500), "1.5s"),
            (StdDuration::from_secs(90), "1m30s"),
            (StdDuration::from_secs(5400), "1h30m0s"),
        ];
        for (duration, expected) in cases {
            assert_eq!(Duration(duration).to_string(), expected);
        }
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(
            Duration::parse("1h30m").unwrap().0,
            StdDuration::from_secs(5400)
        );
        assert_eq!(
            Duration::parse("1h 30m").unwrap().0,
            StdDuration::from_secs(5400)
        );
        assert_eq!(Duration::parse("2us").unwrap().0, StdDuration::from_micros(2));
        assert_eq!(Duration::parse("3µs").unwrap().0, StdDuration::from_micros(3));
        assert_eq!(Duration::parse("+250ms").unwrap().0, StdDuration::from_millis(250));
        assert_eq!(Duration::parse("0").unwrap().0, StdDuration::ZERO);
        assert_eq!(Duration::parse("-0s").unwrap().0, StdDuration::ZERO);
    }

    #[test]
    fn test_duration_parse_errors() {
        assert_eq!(Duration::parse(""), Err(DurationError::Empty));
        assert_eq!(Duration::parse("  "), Err(DurationError::Empty));
        assert!(matches!(
            Duration::parse("-1s"),
            Err(DurationError::Negative(_))
        ));
        for bad in ["5", "h", "soon", "1.5s"] {
            let error = Duration::parse(bad).unwrap_err();
            assert!(
                matches!(&error, DurationError::Invalid { input, .. } if input == bad),
                "{}",
                error
            );
            assert!(error.to_string().starts_with("invalid duration"));
        }
    }

    #[test]
    fn test_duration_from_json_number_is_nanos() {
        let duration: Duration = from_value(json!(1_500_000_000u64)).unwrap();
        assert_eq!(duration.to_string(), "1.5s");
        assert!(from_value::<Duration>(json!(-1)).is_err());
        assert!(from_value::<Duration>(json!("soon")).is_err());
    }

    #[test]
    fn test_round_trip_through_string() {
        let duration = Duration(StdDuration::from_secs(3723));
        let text = to_value(duration).unwrap();
        assert_eq!(text, json!("1h2m3s"));
        assert_eq!(from_value::<Duration>(text).unwrap(), duration);
    }
}
