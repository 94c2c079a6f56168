//! Lexical forms of the date, date-time and duration types.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const MAX_TZ_SECONDS: i32 = 14 * 3600;

/// Split a trailing `Z` / `+hh:mm` / `-hh:mm` off a lexical value.
fn split_timezone(s: &str) -> (&str, Option<&str>) {
    if let Some(body) = s.strip_suffix('Z') {
        return (body, Some("Z"));
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 6 {
        let sign = bytes[bytes.len() - 6];
        if (sign == b'+' || sign == b'-') && bytes[bytes.len() - 3] == b':' {
            let (body, tz) = s.split_at(s.len() - 6);
            return (body, Some(tz));
        }
    }
    (s, None)
}

pub fn parse_timezone(s: &str) -> Option<FixedOffset> {
    if s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = digits(hours)?.try_into().ok()?;
    let minutes: i32 = digits(minutes)?.try_into().ok()?;
    if minutes > 59 {
        return None;
    }
    let seconds = sign * (hours * 3600 + minutes * 60);
    if seconds.abs() > MAX_TZ_SECONDS {
        return None;
    }
    FixedOffset::east_opt(seconds)
}

pub fn format_timezone(tz: FixedOffset) -> String {
    let secs = tz.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_date(s: &str) -> Option<(NaiveDate, Option<FixedOffset>)> {
    let s = s.trim();
    let (body, tz) = split_timezone(s);
    let tz = match tz {
        Some(t) => Some(parse_timezone(t)?),
        None => None,
    };
    if body.len() < 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()?;
    Some((date, tz))
}

pub fn parse_date_time(s: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let s = s.trim();
    let (body, tz) = split_timezone(s);
    let tz = match tz {
        Some(t) => Some(parse_timezone(t)?),
        None => None,
    };
    let (date, time) = body.split_once('T')?;
    if date.len() < 10 || time.len() < 8 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f").ok()?;
    Some((date.and_time(time), tz))
}

pub fn format_date(date: NaiveDate, tz: Option<FixedOffset>) -> String {
    let mut out = date.format("%Y-%m-%d").to_string();
    if let Some(tz) = tz {
        out.push_str(&format_timezone(tz));
    }
    out
}

pub fn format_date_time(value: NaiveDateTime, tz: Option<FixedOffset>) -> String {
    let mut out = value.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = value.nanosecond();
    if nanos != 0 {
        let frac = format!("{nanos:09}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    if let Some(tz) = tz {
        out.push_str(&format_timezone(tz));
    }
    out
}

/// Instant on the UTC time line, using `implicit` when no timezone is given.
pub fn to_utc(value: NaiveDateTime, tz: Option<FixedOffset>, implicit: FixedOffset) -> NaiveDateTime {
    let offset = tz.unwrap_or(implicit);
    value - TimeDelta::seconds(i64::from(offset.local_minus_utc()))
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

/// Take `<digits><designator>` off the front of `s` if present.
fn take_component(s: &str, designator: char) -> Option<(Option<u64>, &str)> {
    match s.find(designator) {
        Some(idx) => Some((Some(digits(&s[..idx])?), &s[idx + 1..])),
        None => Some((None, s)),
    }
}

/// `-?PnDTnHnMn.nS`, at least one component.
pub fn parse_day_time_duration(s: &str) -> Option<TimeDelta> {
    let (negative, rest) = split_sign(s.trim());
    let rest = rest.strip_prefix('P')?;
    let (day_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    let mut seconds: i64 = 0;
    let mut nanos: i64 = 0;
    let mut any = false;
    if !day_part.is_empty() {
        let days = digits(day_part.strip_suffix('D')?)?;
        seconds = i64::try_from(days).ok()?.checked_mul(86_400)?;
        any = true;
    }
    if let Some(time) = time_part {
        if time.is_empty() {
            return None;
        }
        let (hours, time) = take_component(time, 'H')?;
        let (minutes, time) = take_component(time, 'M')?;
        for (value, factor) in [(hours, 3600_i64), (minutes, 60)] {
            if let Some(v) = value {
                seconds = seconds.checked_add(i64::try_from(v).ok()?.checked_mul(factor)?)?;
                any = true;
            }
        }
        if !time.is_empty() {
            let secs = time.strip_suffix('S')?;
            let (whole, frac) = match secs.split_once('.') {
                Some((w, f)) => (w, Some(f)),
                None => (secs, None),
            };
            seconds = seconds.checked_add(i64::try_from(digits(whole)?).ok()?)?;
            if let Some(frac) = frac {
                digits(frac)?;
                let padded: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
                nanos = padded.parse().ok()?;
            }
            any = true;
        }
    }
    if !any {
        return None;
    }
    let delta = TimeDelta::try_seconds(seconds)?.checked_add(&TimeDelta::nanoseconds(nanos))?;
    Some(if negative { -delta } else { delta })
}

pub fn format_day_time_duration(d: TimeDelta) -> String {
    let negative = d < TimeDelta::zero();
    let d = d.abs();
    let total = d.num_seconds();
    let nanos = (d - TimeDelta::seconds(total)).num_nanoseconds().unwrap_or(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 || nanos > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 || nanos > 0 {
            out.push_str(&secs.to_string());
            if nanos > 0 {
                let frac = format!("{:09}", nanos % NANOS_PER_SECOND);
                out.push('.');
                out.push_str(frac.trim_end_matches('0'));
            }
            out.push('S');
        }
    } else if days == 0 {
        out.push_str("T0S");
    }
    out
}

/// `-?PnYnM`, at least one component. Returns total months.
pub fn parse_year_month_duration(s: &str) -> Option<i32> {
    let (negative, rest) = split_sign(s.trim());
    let rest = rest.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (years, rest) = take_component(rest, 'Y')?;
    let (months, rest) = take_component(rest, 'M')?;
    if !rest.is_empty() || (years.is_none() && months.is_none()) {
        return None;
    }
    let total = i32::try_from(years.unwrap_or(0))
        .ok()?
        .checked_mul(12)?
        .checked_add(i32::try_from(months.unwrap_or(0)).ok()?)?;
    Some(if negative { -total } else { total })
}

pub fn format_year_month_duration(months: i32) -> String {
    let sign = if months < 0 { "-" } else { "" };
    let abs = months.unsigned_abs();
    let (y, m) = (abs / 12, abs % 12);
    match (y, m) {
        (0, m) => format!("{sign}P{m}M"),
        (y, 0) => format!("{sign}P{y}Y"),
        (y, m) => format!("{sign}P{y}Y{m}M"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-02-29", "2024-02-29")]
    #[case("2024-02-29Z", "2024-02-29Z")]
    #[case("2024-02-29+00:00", "2024-02-29Z")]
    #[case("2024-02-29-05:00", "2024-02-29-05:00")]
    fn dates_normalize(#[case] input: &str, #[case] expected: &str) {
        let (date, tz) = parse_date(input).unwrap();
        assert_eq!(format_date(date, tz), expected);
    }

    #[rstest]
    #[case("2024-13-01")]
    #[case("2024-02-30")]
    #[case("2024-02-01+15:00")]
    #[case("24-02-01")]
    fn invalid_dates(#[case] input: &str) {
        assert!(parse_date(input).is_none());
    }

    #[rstest]
    #[case("2024-01-02T03:04:05", "2024-01-02T03:04:05")]
    #[case("2024-01-02T03:04:05.500Z", "2024-01-02T03:04:05.5Z")]
    #[case("2024-01-02T03:04:05+01:30", "2024-01-02T03:04:05+01:30")]
    fn date_times_normalize(#[case] input: &str, #[case] expected: &str) {
        let (dt, tz) = parse_date_time(input).unwrap();
        assert_eq!(format_date_time(dt, tz), expected);
    }

    #[rstest]
    #[case("P1D", "P1D")]
    #[case("PT36H", "P1DT12H")]
    #[case("-PT1M30.25S", "-PT1M30.25S")]
    #[case("PT0S", "PT0S")]
    #[case("P0D", "PT0S")]
    fn day_time_durations(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(format_day_time_duration(parse_day_time_duration(input).unwrap()), expected);
    }

    #[rstest]
    #[case("P")]
    #[case("PT")]
    #[case("P1Y")]
    #[case("PT1H2")]
    fn invalid_day_time_durations(#[case] input: &str) {
        assert!(parse_day_time_duration(input).is_none());
    }

    #[rstest]
    #[case("P1Y2M", 14, "P1Y2M")]
    #[case("P14M", 14, "P1Y2M")]
    #[case("-P3M", -3, "-P3M")]
    #[case("P0Y", 0, "P0M")]
    fn year_month_durations(#[case] input: &str, #[case] months: i32, #[case] expected: &str) {
        assert_eq!(parse_year_month_duration(input), Some(months));
        assert_eq!(format_year_month_duration(months), expected);
    }
}
