//! Timestamp normalization
//!
//! Session documents reach us through several access paths and each one
//! encodes instants its own way. The recognizers below are tried in a fixed
//! order and the first shape that is structurally present decides the result:
//!
//! 1. a date-capable value (`RawTimestamp::Native`, `{"$date": ..}`,
//!    `{"timestampValue": ..}`)
//! 2. `{"_seconds": s, "_nanoseconds": n}`
//! 3. `{"seconds": s, "nanos": n}`
//! 4. a plain string or epoch-millisecond number
//!
//! Formatting never fails; an unresolved value degrades to a fixed
//! placeholder and a warning on the log.

use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use log::warn;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::HistoryError;
use crate::model::RawTimestamp;

pub const UNKNOWN_DATE: &str = "Unknown date";
pub const UNKNOWN_TIME: &str = "Unknown time";
pub const NOT_AVAILABLE: &str = "N/A";

/// Naive layouts accepted for plain strings, interpreted in the display zone
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

/// The shapes a timestamp may arrive in, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    DateObject,
    UnderscoreSeconds,
    Seconds,
    Generic,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::DateObject => "date object",
            Shape::UnderscoreSeconds => "_seconds object",
            Shape::Seconds => "seconds object",
            Shape::Generic => "date string/number",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("no timestamp present")]
    Missing,

    #[error("unrecognized timestamp shape: {0}")]
    Unrecognized(String),

    #[error("invalid {shape} value: {value}")]
    Invalid { shape: Shape, value: String },
}

/// Time zone used when formatting (and when reading naive strings)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl DisplayZone {
    pub fn utc() -> Self {
        DisplayZone::Fixed(Utc.fix())
    }

    /// Parse `local`, `UTC`, or a `+HH:MM` / `-HH:MM` offset
    pub fn parse(value: &str) -> Result<Self, HistoryError> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("local") {
            return Ok(DisplayZone::Local);
        }
        if value.eq_ignore_ascii_case("utc") || value == "Z" {
            return Ok(Self::utc());
        }
        value
            .parse::<FixedOffset>()
            .map(DisplayZone::Fixed)
            .map_err(|e| HistoryError::Config(format!("invalid utc_offset '{}': {}", value, e)))
    }

    fn localize(self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            DisplayZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            DisplayZone::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Date and time layout for display strings
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFormat {
    date_format: String,
    time_format: String,
    zone: DisplayZone,
}

impl Default for DisplayFormat {
    /// en-US conventions, e.g. `11/14/2023` and `10:13:20 PM`
    fn default() -> Self {
        Self {
            date_format: "%-m/%-d/%Y".to_string(),
            time_format: "%-I:%M:%S %p".to_string(),
            zone: DisplayZone::Local,
        }
    }
}

impl DisplayFormat {
    pub fn new(date_format: &str, time_format: &str, zone: DisplayZone) -> Result<Self, HistoryError> {
        for layout in [date_format, time_format] {
            if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
                return Err(HistoryError::Config(format!("invalid format string '{}'", layout)));
            }
        }
        Ok(Self {
            date_format: date_format.to_string(),
            time_format: time_format.to_string(),
            zone,
        })
    }

    pub fn zone(&self) -> DisplayZone {
        self.zone
    }

    pub fn with_zone(mut self, zone: DisplayZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    fn render(&self, instant: DateTime<Utc>, layout: &str) -> Option<String> {
        let mut out = String::new();
        let written = match self.zone {
            DisplayZone::Local => write!(out, "{}", instant.with_timezone(&Local).format(layout)),
            DisplayZone::Fixed(offset) => write!(out, "{}", instant.with_timezone(&offset).format(layout)),
        };
        written.ok().map(|_| out)
    }
}

type Recognizer = fn(&TimestampNormalizer, &RawTimestamp) -> Option<Result<DateTime<Utc>, TimestampError>>;

/// Recognizers in priority order. Each returns `None` when its shape is
/// not present at all.
const RECOGNIZERS: [Recognizer; 4] = [
    TimestampNormalizer::recognize_date_object,
    TimestampNormalizer::recognize_underscore_seconds,
    TimestampNormalizer::recognize_seconds,
    TimestampNormalizer::recognize_generic,
];

/// Resolves raw timestamps and formats them for display
#[derive(Debug, Clone, Default)]
pub struct TimestampNormalizer {
    format: DisplayFormat,
}

impl TimestampNormalizer {
    pub fn new(format: DisplayFormat) -> Self {
        Self { format }
    }

    /// Resolve a raw timestamp to an instant using the first matching shape
    pub fn resolve(&self, raw: &RawTimestamp) -> Result<DateTime<Utc>, TimestampError> {
        if *raw == RawTimestamp::Missing {
            return Err(TimestampError::Missing);
        }
        RECOGNIZERS
            .iter()
            .find_map(|recognize| recognize(self, raw))
            .unwrap_or_else(|| Err(TimestampError::Unrecognized(describe(raw))))
    }

    /// Date and time strings for a session start, falling back to
    /// `Unknown date` / `Unknown time`
    pub fn format_session_start(&self, raw: &RawTimestamp) -> (String, String) {
        let rendered = self.resolve(raw).map_err(|e| e.to_string()).and_then(|instant| {
            let date = self.format.render(instant, &self.format.date_format);
            let time = self.format.render(instant, &self.format.time_format);
            date.zip(time).ok_or_else(|| "format failed".to_string())
        });
        match rendered {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Could not format session start time: {}", e);
                (UNKNOWN_DATE.to_string(), UNKNOWN_TIME.to_string())
            }
        }
    }

    /// Time string for a reading, falling back to `N/A`
    pub fn format_reading_time(&self, raw: &RawTimestamp) -> String {
        let rendered = self
            .resolve(raw)
            .map_err(|e| e.to_string())
            .and_then(|instant| {
                self.format
                    .render(instant, &self.format.time_format)
                    .ok_or_else(|| "format failed".to_string())
            });
        match rendered {
            Ok(time) => time,
            Err(e) => {
                warn!("Could not format reading time: {}", e);
                NOT_AVAILABLE.to_string()
            }
        }
    }

    fn recognize_date_object(&self, raw: &RawTimestamp) -> Option<Result<DateTime<Utc>, TimestampError>> {
        match raw {
            RawTimestamp::Native(instant) => Some(Ok(*instant)),
            RawTimestamp::Document(Value::Object(map)) => {
                let inner = map.get("$date").or_else(|| map.get("timestampValue"))?;
                let resolved = match inner {
                    Value::String(s) => parse_rfc3339(s),
                    Value::Number(_) => epoch_millis(inner),
                    // canonical extended JSON: {"$date": {"$numberLong": "..."}}
                    Value::Object(long) => long
                        .get("$numberLong")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<i64>().ok())
                        .and_then(DateTime::from_timestamp_millis),
                    _ => None,
                };
                Some(resolved.ok_or_else(|| invalid(Shape::DateObject, inner)))
            }
            _ => None,
        }
    }

    fn recognize_underscore_seconds(&self, raw: &RawTimestamp) -> Option<Result<DateTime<Utc>, TimestampError>> {
        let map = as_object(raw)?;
        let seconds = map.get("_seconds")?;
        Some(
            epoch_seconds(seconds, map.get("_nanoseconds"))
                .ok_or_else(|| invalid(Shape::UnderscoreSeconds, seconds)),
        )
    }

    fn recognize_seconds(&self, raw: &RawTimestamp) -> Option<Result<DateTime<Utc>, TimestampError>> {
        let map = as_object(raw)?;
        let seconds = map.get("seconds")?;
        let nanos = map.get("nanos").or_else(|| map.get("nanoseconds"));
        Some(epoch_seconds(seconds, nanos).ok_or_else(|| invalid(Shape::Seconds, seconds)))
    }

    fn recognize_generic(&self, raw: &RawTimestamp) -> Option<Result<DateTime<Utc>, TimestampError>> {
        let value = match raw {
            RawTimestamp::Document(v @ (Value::String(_) | Value::Number(_))) => v,
            _ => return None,
        };
        let resolved = match value {
            Value::String(s) => self.parse_text(s),
            _ => epoch_millis(value),
        };
        Some(resolved.ok_or_else(|| invalid(Shape::Generic, value)))
    }

    fn parse_text(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if let Some(instant) = parse_rfc3339(text) {
            return Some(instant);
        }
        if let Ok(instant) = DateTime::parse_from_rfc2822(text) {
            return Some(instant.with_timezone(&Utc));
        }
        NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .and_then(|naive| self.format.zone.localize(naive))
    }
}

fn as_object(raw: &RawTimestamp) -> Option<&Map<String, Value>> {
    match raw {
        RawTimestamp::Document(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn parse_rfc3339(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn epoch_seconds(seconds: &Value, nanos: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = whole_number(seconds)?;
    let nanos = match nanos {
        None | Some(Value::Null) => 0,
        Some(n) => u32::try_from(whole_number(n)?).ok()?,
    };
    DateTime::from_timestamp(seconds, nanos)
}

fn epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(whole_number(value)?)
}

/// Integer part of a JSON number (or numeric string, as some exports write
/// 64-bit values)
fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn invalid(shape: Shape, value: &Value) -> TimestampError {
    TimestampError::Invalid {
        shape,
        value: value.to_string(),
    }
}

fn describe(raw: &RawTimestamp) -> String {
    match raw {
        RawTimestamp::Native(instant) => instant.to_rfc3339(),
        RawTimestamp::Document(value) => value.to_string(),
        RawTimestamp::Missing => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc_normalizer() -> TimestampNormalizer {
        TimestampNormalizer::new(DisplayFormat::default().with_zone(DisplayZone::utc()))
    }

    fn doc(value: Value) -> RawTimestamp {
        RawTimestamp::Document(value)
    }

    #[test]
    fn test_native_date_object() {
        let n = utc_normalizer();
        let instant = DateTime::from_timestamp(1700000000, 0).unwrap();
        let (date, time) = n.format_session_start(&instant.into());
        assert_eq!(date, "11/14/2023");
        assert_eq!(time, "10:13:20 PM");
    }

    #[test]
    fn test_extended_json_date_object() {
        let n = utc_normalizer();
        assert_eq!(
            n.format_reading_time(&doc(json!({"$date": "2023-11-14T22:13:20Z"}))),
            "10:13:20 PM"
        );
        assert_eq!(
            n.format_reading_time(&doc(json!({"$date": {"$numberLong": "1700000000000"}}))),
            "10:13:20 PM"
        );
        assert_eq!(
            n.format_reading_time(&doc(json!({"timestampValue": "2023-11-14T22:13:20.123Z"}))),
            "10:13:20 PM"
        );
    }

    #[test]
    fn test_underscore_seconds_object() {
        let n = utc_normalizer();
        let raw = doc(json!({"_seconds": 1700000000, "_nanoseconds": 500000000}));
        assert_eq!(
            n.format_session_start(&raw),
            ("11/14/2023".to_string(), "10:13:20 PM".to_string())
        );
    }

    #[test]
    fn test_seconds_object() {
        let n = utc_normalizer();
        let raw = doc(json!({"seconds": "1700000100", "nanos": 0}));
        assert_eq!(n.format_reading_time(&raw), "10:15:00 PM");
    }

    #[test]
    fn test_generic_string_and_number() {
        let n = utc_normalizer();
        assert_eq!(n.format_reading_time(&doc(json!("2023-11-14T22:13:20Z"))), "10:13:20 PM");
        assert_eq!(n.format_reading_time(&doc(json!("Tue, 14 Nov 2023 22:13:20 +0000"))), "10:13:20 PM");
        assert_eq!(n.format_reading_time(&doc(json!("2023/11/14 22:13"))), "10:13:00 PM");
        assert_eq!(n.format_reading_time(&doc(json!(1700000000000_i64))), "10:13:20 PM");
        assert_eq!(
            n.format_session_start(&doc(json!("2023-11-14"))),
            ("11/14/2023".to_string(), "12:00:00 AM".to_string())
        );
    }

    #[test]
    fn test_fallbacks() {
        let n = utc_normalizer();
        for raw in [
            doc(json!("not-a-date")),
            doc(json!(true)),
            doc(json!({})),
            doc(json!([1700000000])),
            RawTimestamp::Missing,
        ] {
            assert_eq!(n.format_reading_time(&raw), NOT_AVAILABLE);
            assert_eq!(
                n.format_session_start(&raw),
                (UNKNOWN_DATE.to_string(), UNKNOWN_TIME.to_string())
            );
        }
    }

    #[test]
    fn test_date_object_wins_over_underscore_seconds() {
        let n = utc_normalizer();
        let raw = doc(json!({"$date": "2020-01-01T00:00:00Z", "_seconds": 1700000000}));
        assert_eq!(n.format_session_start(&raw).0, "1/1/2020");
    }

    #[test]
    fn test_underscore_seconds_wins_over_seconds() {
        let n = utc_normalizer();
        let raw = doc(json!({"_seconds": 1700000000, "seconds": 0}));
        assert_eq!(n.format_session_start(&raw).0, "11/14/2023");
    }

    #[test]
    fn test_first_present_shape_decides_even_when_invalid() {
        let n = utc_normalizer();
        let raw = doc(json!({"_seconds": "soon", "seconds": 1700000000}));
        assert_eq!(
            n.resolve(&raw),
            Err(TimestampError::Invalid {
                shape: Shape::UnderscoreSeconds,
                value: "\"soon\"".to_string()
            })
        );
        assert_eq!(n.format_reading_time(&raw), NOT_AVAILABLE);
    }

    #[test]
    fn test_resolve_errors() {
        let n = utc_normalizer();
        assert_eq!(n.resolve(&RawTimestamp::Missing), Err(TimestampError::Missing));
        assert!(matches!(n.resolve(&doc(json!(false))), Err(TimestampError::Unrecognized(_))));
    }

    #[test]
    fn test_fixed_offset_zone() {
        let zone = DisplayZone::parse("+02:00").unwrap();
        let n = TimestampNormalizer::new(DisplayFormat::default().with_zone(zone));
        let (date, time) = n.format_session_start(&doc(json!({"seconds": 1700000000})));
        assert_eq!(date, "11/15/2023");
        assert_eq!(time, "12:13:20 AM");
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!(DisplayZone::parse("local").unwrap(), DisplayZone::Local);
        assert_eq!(DisplayZone::parse("UTC").unwrap(), DisplayZone::utc());
        assert!(DisplayZone::parse("somewhere").is_err());
    }

    #[test]
    fn test_custom_format() {
        let format = DisplayFormat::new("%Y-%m-%d", "%H:%M", DisplayZone::utc()).unwrap();
        let n = TimestampNormalizer::new(format);
        assert_eq!(
            n.format_session_start(&doc(json!({"seconds": 1700000000}))),
            ("2023-11-14".to_string(), "22:13".to_string())
        );
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(DisplayFormat::new("%Q", "%H:%M", DisplayZone::Local).is_err());
    }
}
