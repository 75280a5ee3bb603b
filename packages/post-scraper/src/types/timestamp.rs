//! Forum timestamp parsing.
//!
//! Forums print dates in whatever format the board owner configured. The
//! parser normalises the common connective words, then tries a fixed list
//! of layouts, interpreting the result in the configured UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Layouts that carry both a date and a time of day.
const DATETIME_LAYOUTS: &[&str] = &[
    "%a %b %d, %Y %I:%M %p",
    "%a %b %d, %Y %H:%M",
    "%a %b %d %Y %I:%M %p",
    "%a %b %d %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%b %d %Y %I:%M %p",
    "%d %b %Y %H:%M",
    "%d %b %Y, %H:%M",
    "%a %d %b %Y %H:%M",
    "%a %d %b, %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Numeric layouts whose day/month order depends on the board locale.
const US_NUMERIC_LAYOUTS: &[&str] = &["%m/%d/%Y %I:%M %p", "%m/%d/%Y %H:%M", "%m/%d/%y %H:%M"];
const NON_US_NUMERIC_LAYOUTS: &[&str] = &["%d/%m/%Y %I:%M %p", "%d/%m/%Y %H:%M", "%d/%m/%y %H:%M"];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%b %d, %Y", "%d %b %Y"];
const US_DATE_LAYOUTS: &[&str] = &["%m/%d/%Y"];
const NON_US_DATE_LAYOUTS: &[&str] = &["%d/%m/%Y"];

fn normalise(raw: &str) -> String {
    let unescaped = raw.replace("&raquo;", " ").replace("&nbsp;", " ");
    let collapsed = unescaped.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut text = collapsed.as_str();
    for prefix in ["on ", "On ", "at ", "At "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest;
            break;
        }
    }
    text.replace(" at ", " ")
        .replace(" - ", " ")
        .trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}

/// Parse a timestamp as printed by a forum.
///
/// Returns `None` when no known layout matches. ISO 8601 values (as found in
/// `datetime` attributes) carry their own offset and ignore `offset`.
pub fn parse_forum_timestamp(
    raw: &str,
    non_us_date_format: bool,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let text = normalise(raw);
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text)
        .or_else(|_| DateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%z"))
    {
        return Some(dt.with_timezone(&Utc));
    }

    let (numeric, numeric_dates) = if non_us_date_format {
        (NON_US_NUMERIC_LAYOUTS, NON_US_DATE_LAYOUTS)
    } else {
        (US_NUMERIC_LAYOUTS, US_DATE_LAYOUTS)
    };

    let naive = DATETIME_LAYOUTS
        .iter()
        .chain(numeric)
        .find_map(|layout| NaiveDateTime::parse_from_str(&text, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .chain(numeric_dates)
                .find_map(|layout| NaiveDate::parse_from_str(&text, layout).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a UTC offset such as `UTC`, `Z`, `+10:00`, `-0530` or `+2`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let text = raw.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("utc") || text == "Z" || text.eq_ignore_ascii_case("gmt") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_phpbb_prosilver_format() {
        let parsed = parse_forum_timestamp("Mon Sep 28, 2015 6:05 pm", false, utc());
        assert_eq!(parsed, Some(at(2015, 9, 28, 18, 5)));
    }

    #[test]
    fn test_leading_on_is_stripped() {
        let parsed = parse_forum_timestamp("on Mon Sep 28, 2015 6:05 am", false, utc());
        assert_eq!(parsed, Some(at(2015, 9, 28, 6, 5)));
    }

    #[test]
    fn test_phpbb_author_line_separator_is_stripped() {
        let parsed = parse_forum_timestamp(" &raquo; Mon Sep 28, 2015 6:05 pm ", false, utc());
        assert_eq!(parsed, Some(at(2015, 9, 28, 18, 5)));
    }

    #[test]
    fn test_xenforo_at_is_stripped() {
        let parsed = parse_forum_timestamp("Sep 28, 2015 at 6:05 PM", false, utc());
        assert_eq!(parsed, Some(at(2015, 9, 28, 18, 5)));
    }

    #[test]
    fn test_rfc3339_keeps_its_own_offset() {
        let plus_ten = FixedOffset::east_opt(10 * 3600).unwrap();
        let parsed = parse_forum_timestamp("2015-09-28T18:05:00+00:00", false, plus_ten);
        assert_eq!(parsed, Some(at(2015, 9, 28, 18, 5)));
    }

    #[test]
    fn test_iso_offset_without_colon() {
        let parsed = parse_forum_timestamp("2015-09-28T18:05:00+0000", false, utc());
        assert_eq!(parsed, Some(at(2015, 9, 28, 18, 5)));
    }

    #[test]
    fn test_offset_is_applied() {
        let plus_ten = FixedOffset::east_opt(10 * 3600).unwrap();
        let parsed = parse_forum_timestamp("2015-09-28 18:05", false, plus_ten);
        assert_eq!(parsed, Some(at(2015, 9, 28, 8, 5)));
    }

    #[test]
    fn test_non_us_numeric_dates() {
        let us = parse_forum_timestamp("04/03/2014 10:00", false, utc());
        let non_us = parse_forum_timestamp("04/03/2014 10:00", true, utc());
        assert_eq!(us, Some(at(2014, 4, 3, 10, 0)));
        assert_eq!(non_us, Some(at(2014, 3, 4, 10, 0)));
    }

    #[test]
    fn test_date_only_is_midnight() {
        let parsed = parse_forum_timestamp("2013-04-30", false, utc());
        assert_eq!(parsed, Some(at(2013, 4, 30, 0, 0)));
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_forum_timestamp("yesterday-ish", false, utc()), None);
        assert_eq!(parse_forum_timestamp("   ", false, utc()), None);
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("+10:00"), FixedOffset::east_opt(36000));
        assert_eq!(parse_utc_offset("-0530"), FixedOffset::west_opt(19800));
        assert_eq!(parse_utc_offset("+2"), FixedOffset::east_opt(7200));
        assert_eq!(parse_utc_offset("Australia/Sydney"), None);
        assert_eq!(parse_utc_offset("+25:00"), None);
    }
}
