//! Temporal and boolean literal rewriting for compiled note queries.
//!
//! After placeholder substitution the statement text may still contain
//! brace-delimited literals: `{True}`, `{Now}`, relative timespans like
//! `{2d 3:30}`, absolute instants like `{2024/06/09 22:50:00}`. A single
//! scan classifies each `{...}` group exactly once and replaces it with
//! the storage-native integer encoding (epoch seconds, 0/1). Groups that
//! match no literal form pass through untouched.

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use nota_core::temporal::{encode_timestamp, timespan_seconds, utc_midnight};

/// Relative timespan: `<N>d`, optionally ` <H>:<MM>` or ` <H>:<MM>:<SS>`.
static TIMESPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)d(?: (\d{1,2}):(\d{2})(?::(\d{2}))?)?$").expect("timespan pattern")
});

/// Absolute instant: `<Y>/<M>/<D>` with slash or dash separators,
/// optionally followed by ` <H>:<MM>` or ` <H>:<MM>:<SS>`.
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})(?: (\d{1,2}):(\d{2})(?::(\d{2}))?)?$")
        .expect("datetime pattern")
});

/// Rewrite every recognized literal in `text` against the current instant.
pub fn rewrite_literals(text: &str) -> String {
    rewrite_literals_at(text, Utc::now())
}

/// Rewrite literals against a fixed instant. Keyword literals (`{Now}`,
/// `{Today}`, ...) are anchored to `now`; everything else is independent
/// of it.
pub fn rewrite_literals_at(text: &str, now: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            // unterminated group: emit verbatim and stop scanning
            out.push('{');
            out.push_str(after);
            return out;
        };
        let body = &after[..end];
        match rewrite_group(body, now) {
            Some(replacement) => out.push_str(&replacement),
            None => {
                out.push('{');
                out.push_str(body);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn rewrite_group(body: &str, now: DateTime<Utc>) -> Option<String> {
    match body {
        "True" => return Some("1".to_string()),
        "False" => return Some("0".to_string()),
        "Now" => return Some(encode_timestamp(now).to_string()),
        "Today" => return Some(encode_timestamp(utc_midnight(now)).to_string()),
        "Yesterday" => {
            return Some(encode_timestamp(utc_midnight(now) - Duration::days(1)).to_string())
        }
        "Tomorrow" => {
            return Some(encode_timestamp(utc_midnight(now) + Duration::days(1)).to_string())
        }
        _ => {}
    }

    if let Some(caps) = TIMESPAN.captures(body) {
        let days: i64 = caps[1].parse().ok()?;
        let hours: i64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let minutes: i64 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let seconds: i64 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        return Some(timespan_seconds(days, hours, minutes, seconds).to_string());
    }

    if let Some(caps) = DATETIME.captures(body) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let hour: u32 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let minute: u32 = caps.get(5).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let second: u32 = caps.get(6).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let dt = Utc
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()?;
        return Some(encode_timestamp(dt).to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 9, 22, 50, 30).unwrap()
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(rewrite_literals("{True}"), "1");
        assert_eq!(rewrite_literals("{False}"), "0");
        assert_eq!(
            rewrite_literals("x = {True} AND y = {False}"),
            "x = 1 AND y = 0"
        );
    }

    #[test]
    fn test_now_rounds_to_seconds() {
        assert_eq!(rewrite_literals_at("{Now}", fixed_now()), "1717973430");
    }

    #[test]
    fn test_day_keywords_anchor_to_utc_midnight() {
        assert_eq!(rewrite_literals_at("{Today}", fixed_now()), "1717891200");
        assert_eq!(
            rewrite_literals_at("{Yesterday}", fixed_now()),
            "1717804800"
        );
        assert_eq!(rewrite_literals_at("{Tomorrow}", fixed_now()), "1717977600");
    }

    #[test]
    fn test_timespan_literal() {
        assert_eq!(rewrite_literals("{1d 1:00:01}"), "90001");
        assert_eq!(rewrite_literals("{0d 3:00}"), "10800");
        assert_eq!(rewrite_literals("{7d}"), "604800");
    }

    #[test]
    fn test_absolute_datetime_literal() {
        assert_eq!(rewrite_literals("{2024/06/09 22:50:00}"), "1717973400");
        assert_eq!(rewrite_literals("{2024-06-09 22:50:00}"), "1717973400");
        // time defaults to midnight
        assert_eq!(rewrite_literals("{2024/06/09}"), "1717891200");
    }

    #[test]
    fn test_composed_literals() {
        assert_eq!(
            rewrite_literals_at("n.date >= {Now} + {0d 3:00}", fixed_now()),
            "n.date >= 1717973430 + 10800"
        );
    }

    #[test]
    fn test_unrecognized_groups_pass_through() {
        assert_eq!(rewrite_literals("{nonsense}"), "{nonsense}");
        assert_eq!(rewrite_literals("{2024/13/40}"), "{2024/13/40}");
        assert_eq!(rewrite_literals("a { b"), "a { b");
    }

    #[test]
    fn test_adjacent_groups_do_not_interfere() {
        assert_eq!(rewrite_literals("{True}{False}{7d}"), "10604800");
    }
}
