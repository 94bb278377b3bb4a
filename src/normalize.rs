//! Numeric and temporal normalization of dsmadmc field values
//!
//! dsmadmc formats numbers according to the server locale, so `99.8`,
//! `99,8` and `1,234` all show up in practice. Timestamps are naive server
//! local times with microsecond fractions.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error_handling::ParseError;

/// Layout of timestamps in dsmadmc output
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Layout used when writing timestamps into queries
pub const QUERY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Time zone server timestamps are read in
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Zone {
    #[default]
    Local,
    Named(Tz),
}

impl Zone {
    pub fn named(name: &str) -> Result<Self, String> {
        name.parse::<Tz>()
            .map(Zone::Named)
            .map_err(|e| e.to_string())
    }

    /// Resolve a naive server time, taking the earlier instant on DST overlap
    pub fn to_utc(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Zone::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Zone::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Current wall clock time in this zone
    pub fn now(&self) -> NaiveDateTime {
        self.localize(&Utc::now())
    }

    pub fn localize(&self, instant: &DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => instant.with_timezone(&Local).naive_local(),
            Zone::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }
}

/// Parse a locale formatted float.
///
/// A comma followed by exactly one or two trailing digits is a decimal
/// separator and any periods before it are grouping; every other comma is
/// grouping and is dropped.
pub fn parse_float(value: &str) -> Result<f64, ParseError> {
    let normalized = normalize_number(value)?;
    normalized.parse::<f64>().map_err(|_| invalid_number(value))
}

/// Parse a percentage into a 0.0-1.0 ratio.
///
/// The scaling is applied to the decimal exponent so `88.6` becomes exactly
/// the float nearest to `0.886`.
pub fn parse_percent(value: &str) -> Result<f64, ParseError> {
    let normalized = normalize_number(value)?;
    format!("{normalized}e-2")
        .parse::<f64>()
        .map_err(|_| invalid_number(value))
}

fn normalize_number(value: &str) -> Result<String, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid_number(value));
    }

    let normalized = match trimmed.rfind(',') {
        Some(idx) if is_decimal_tail(&trimmed[idx + 1..]) => {
            let (whole, fraction) = trimmed.split_at(idx);
            format!("{}.{}", whole.replace(['.', ','], ""), &fraction[1..])
        }
        Some(_) => trimmed.replace(',', ""),
        None => trimmed.to_string(),
    };

    // f64 parsing also takes "inf", "NaN" and exponents, dsmadmc never prints those
    if normalized.chars().any(char::is_alphabetic) {
        return Err(invalid_number(value));
    }
    Ok(normalized)
}

fn invalid_number(value: &str) -> ParseError {
    ParseError::InvalidNumber {
        column: String::new(),
        value: value.to_string(),
    }
}

fn is_decimal_tail(tail: &str) -> bool {
    (1..=2).contains(&tail.len()) && tail.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a dsmadmc timestamp in the given zone; an empty value means "never"
pub fn parse_timestamp(value: &str, zone: &Zone) -> Result<Option<DateTime<Utc>>, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let invalid = || ParseError::InvalidTimestamp {
        column: String::new(),
        value: value.to_string(),
    };
    let naive = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
    zone.to_utc(&naive).map(Some).ok_or_else(invalid)
}

/// Seconds between start and end, never negative
pub fn duration_seconds(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> f64 {
    match (start, end) {
        (Some(start), Some(end)) if end >= start => {
            (end - start).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
        }
        _ => 0.0,
    }
}

/// Unix seconds of an instant, 0 for missing or pre-epoch values
pub fn timestamp_seconds(instant: Option<DateTime<Utc>>) -> f64 {
    match instant {
        Some(t) if t.timestamp() >= 0 => t.timestamp_micros() as f64 / 1_000_000.0,
        _ => 0.0,
    }
}

/// End timestamp that is only meaningful when it follows its start
pub fn end_after_start(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => None,
        (_, end) => end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_float_period_and_comma_decimal() {
        assert_eq!(parse_float("99.8").unwrap(), 99.8);
        assert_eq!(parse_float("99,8").unwrap(), 99.8);
        assert_eq!(parse_float("0,25").unwrap(), 0.25);
        assert_eq!(parse_float(" 42 ").unwrap(), 42.0);
    }

    #[test]
    fn test_parse_float_grouping_commas() {
        assert_eq!(parse_float("1,234").unwrap(), 1234.0);
        assert_eq!(parse_float("1,234,567").unwrap(), 1_234_567.0);
        assert_eq!(parse_float("1,234.5").unwrap(), 1234.5);
        assert_eq!(parse_float("1.234,56").unwrap(), 1234.56);
    }

    #[test]
    fn test_parse_percent_is_exact() {
        assert_eq!(parse_percent("88.6").unwrap(), 0.886);
        assert_eq!(parse_percent("98,3").unwrap(), 0.983);
        assert_eq!(parse_percent("100").unwrap(), 1.0);
        assert!(parse_percent("x").is_err());
    }

    #[test]
    fn test_parse_float_rejects_garbage() {
        assert!(parse_float("").is_err());
        assert!(parse_float("n/a").is_err());
        assert!(parse_float("inf").is_err());
        assert!(parse_float("1e5").is_err());
        assert!(matches!(
            parse_float("12,x"),
            Err(ParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_parse_timestamp_fractional_and_plain() {
        let zone = Zone::named("UTC").unwrap();
        let ts = parse_timestamp("2020-03-26 13:33:19.000000", &zone).unwrap().unwrap();
        assert_eq!(ts.timestamp(), 1585229599);

        let ts = parse_timestamp("2020-03-26 13:33:19", &zone).unwrap().unwrap();
        assert_eq!(ts.timestamp(), 1585229599);

        assert_eq!(parse_timestamp("", &zone).unwrap(), None);
        assert!(parse_timestamp("26/03/2020", &zone).is_err());
    }

    #[test]
    fn test_parse_timestamp_honours_zone() {
        let zone = Zone::named("America/New_York").unwrap();
        let ts = parse_timestamp("2020-03-26 09:33:19.000000", &zone).unwrap().unwrap();
        assert_eq!(ts.timestamp(), 1585229599);
    }

    #[test]
    fn test_duration_never_negative() {
        let zone = Zone::named("UTC").unwrap();
        let start = parse_timestamp("2020-03-26 10:00:00.000000", &zone).unwrap();
        let end = parse_timestamp("2020-03-26 10:01:30.500000", &zone).unwrap();

        assert_eq!(duration_seconds(start, end), 90.5);
        assert_eq!(duration_seconds(end, start), 0.0);
        assert_eq!(duration_seconds(start, None), 0.0);
        assert_eq!(end_after_start(end, start), None);
        assert_eq!(end_after_start(start, end), end);
    }

    #[test]
    fn test_timestamp_seconds_clamps_pre_epoch() {
        let old = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(timestamp_seconds(Some(old)), 0.0);
        assert_eq!(timestamp_seconds(None), 0.0);
    }
}
