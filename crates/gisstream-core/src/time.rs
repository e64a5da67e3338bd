//! Lenient parsing of KML `dateTime` values
//!
//! KML allows `gYear`, `gYearMonth`, `date` and `dateTime`. Desktop clients go
//! further and accept times without seconds or without a zone designator; this
//! parser mirrors that leniency and always yields UTC.

use crate::error::{GeoError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
const ZONED_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Parse a KML time value into a UTC instant.
///
/// Accepted forms, in order of preference:
/// - RFC 3339 (`2009-03-14T21:10:50Z`, `2009-03-14T21:10:50-08:00`)
/// - date and time without zone (UTC assumed), with or without seconds
/// - date only (`2009-03-14`), year and month (`2009-03`), year (`2009`)
///
/// # Errors
///
/// Returns [`GeoError::InvalidTime`] when none of the layouts match.
pub fn parse_kml_time(text: &str) -> Result<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return Err(GeoError::InvalidTime(String::new()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for layout in ZONED_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(s, layout) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    let naive = s.strip_suffix('Z').unwrap_or(s);
    for layout in NAIVE_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, layout) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return midnight(date, s);
    }
    let mut parts = naive.splitn(2, '-');
    let year = parts.next().and_then(parse_year);
    let month = match parts.next() {
        Some(m) if m.len() == 2 => m.parse::<u32>().ok(),
        Some(_) => None,
        None => Some(1),
    };
    if let (Some(year), Some(month)) = (year, month) {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1) {
            return midnight(date, s);
        }
    }
    Err(GeoError::InvalidTime(s.to_string()))
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn midnight(date: NaiveDate, original: &str) -> Result<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| GeoError::InvalidTime(original.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_rfc3339_with_offset() {
        let t = parse_kml_time("2009-03-14T21:10:50-08:00").unwrap();
        assert_eq!(t.hour(), 5);
        assert_eq!(t.day(), 15);
    }

    #[test]
    fn test_missing_zone_assumes_utc() {
        let t = parse_kml_time("2009-03-14T21:10:50").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (21, 10, 50));
    }

    #[test]
    fn test_missing_seconds() {
        let t = parse_kml_time("2009-03-14T21:10Z").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (21, 10, 0));
    }

    #[test]
    fn test_partial_dates() {
        let t = parse_kml_time("1997-07-16").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (1997, 7, 16));
        let t = parse_kml_time("1997-07").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (1997, 7, 1));
        let t = parse_kml_time("1997").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (1997, 1, 1));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_kml_time("yesterday").is_err());
        assert!(parse_kml_time("").is_err());
        assert!(parse_kml_time("1997-13").is_err());
        assert!(parse_kml_time("97").is_err());
    }
}
