//! Calendar arithmetic for `Date` and `Timestamp` values.
//!
//! Dates are days since 1970-01-01 in the proleptic Gregorian calendar,
//! timestamps are microseconds since 1970-01-01 00:00:00 with no time zone.

use alloc::format;
use alloc::string::String;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Converts a civil date to days since the epoch.
pub fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Converts days since the epoch to `(year, month, day)`.
pub fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
    }
}

fn parse_number(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses `YYYY-MM-DD` into days since the epoch.
pub fn parse_date(input: &str) -> Option<i32> {
    let s = input.trim();
    let mut parts = s.splitn(3, '-');
    let year = parse_number(parts.next()?)?;
    let month = parse_number(parts.next()?)? as u32;
    let day = parse_number(parts.next()?)? as u32;
    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }
    i32::try_from(days_from_civil(year, month, day)).ok()
}

/// Parses `YYYY-MM-DD[ |T]HH:MM[:SS[.ffffff]]` into microseconds since the epoch.
///
/// A bare date is accepted as midnight.
pub fn parse_timestamp(input: &str) -> Option<i64> {
    let s = input.trim();
    let (date_part, time_part) = match s.find(|c: char| c == ' ' || c == 'T') {
        Some(pos) => (&s[..pos], Some(s[pos + 1..].trim())),
        None => (s, None),
    };
    let days = parse_date(date_part)? as i64;
    let mut micros = days * MICROS_PER_DAY;
    if let Some(time) = time_part {
        let (clock, fraction) = match time.split_once('.') {
            Some((c, f)) => (c, Some(f)),
            None => (time, None),
        };
        let mut fields = clock.split(':');
        let hour = parse_number(fields.next()?)?;
        let minute = parse_number(fields.next()?)?;
        let second = match fields.next() {
            Some(sec) => parse_number(sec)?,
            None => 0,
        };
        if fields.next().is_some() || hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        micros += ((hour * 60 + minute) * 60 + second) * MICROS_PER_SECOND;
        if let Some(frac) = fraction {
            if frac.is_empty() || frac.len() > 6 {
                return None;
            }
            let mut value = parse_number(frac)?;
            for _ in frac.len()..6 {
                value *= 10;
            }
            micros += value;
        }
    }
    Some(micros)
}

/// Formats days since the epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    let (y, m, d) = civil_from_days(days as i64);
    format!("{:04}-{:02}-{:02}", y, m, d)
}

/// Formats microseconds since the epoch as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn format_timestamp(micros: i64) -> String {
    let days = micros.div_euclid(MICROS_PER_DAY);
    let rem = micros.rem_euclid(MICROS_PER_DAY);
    let (y, m, d) = civil_from_days(days);
    let secs = rem / MICROS_PER_SECOND;
    let frac = rem % MICROS_PER_SECOND;
    let (hh, mm, ss) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if frac == 0 {
        format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, hh, mm, ss)
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            y, m, d, hh, mm, ss, frac
        )
    }
}

/// Field selector for `EXTRACT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Extracts a calendar field from a timestamp.
pub fn extract(part: DatePart, micros: i64) -> i64 {
    let days = micros.div_euclid(MICROS_PER_DAY);
    let secs = micros.rem_euclid(MICROS_PER_DAY) / MICROS_PER_SECOND;
    let (y, m, d) = civil_from_days(days);
    match part {
        DatePart::Year => y,
        DatePart::Month => m as i64,
        DatePart::Day => d as i64,
        DatePart::Hour => secs / 3600,
        DatePart::Minute => (secs / 60) % 60,
        DatePart::Second => secs % 60,
    }
}

/// Truncates a timestamp down to the start of its day, month or year.
pub fn truncate(part: DatePart, micros: i64) -> i64 {
    let days = micros.div_euclid(MICROS_PER_DAY);
    let (y, m, _) = civil_from_days(days);
    let start = match part {
        DatePart::Year => days_from_civil(y, 1, 1),
        DatePart::Month => days_from_civil(y, m, 1),
        DatePart::Day => days,
        DatePart::Hour | DatePart::Minute | DatePart::Second => {
            let unit = match part {
                DatePart::Hour => 3600 * MICROS_PER_SECOND,
                DatePart::Minute => 60 * MICROS_PER_SECOND,
                _ => MICROS_PER_SECOND,
            };
            return micros.div_euclid(unit) * unit;
        }
    };
    start * MICROS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_roundtrip_known_dates() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(civil_from_days(11_017), (2000, 3, 1));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("1970-01-02"), Some(1));
        assert_eq!(parse_date("2024-02-29").map(format_date).as_deref(), Some("2024-02-29"));
        assert_eq!(parse_date("2023-02-29"), None);
        assert_eq!(parse_date("2023-13-01"), None);
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("1970-01-02 01:02:03.5").unwrap();
        assert_eq!(ts, MICROS_PER_DAY + 3_723 * MICROS_PER_SECOND + 500_000);
        assert_eq!(format_timestamp(ts), "1970-01-02 01:02:03.500000");
        assert_eq!(parse_timestamp("1970-01-01"), Some(0));
        assert_eq!(parse_timestamp("1970-01-01 25:00:00"), None);
    }

    #[test]
    fn test_extract_and_truncate() {
        let ts = parse_timestamp("2021-07-15 10:20:30").unwrap();
        assert_eq!(extract(DatePart::Year, ts), 2021);
        assert_eq!(extract(DatePart::Month, ts), 7);
        assert_eq!(extract(DatePart::Minute, ts), 20);
        assert_eq!(
            format_timestamp(truncate(DatePart::Month, ts)),
            "2021-07-01 00:00:00"
        );
    }
}
