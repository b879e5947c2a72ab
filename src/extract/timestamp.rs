//! Timestamp normalization to Unix seconds.
//!
//! The upstream renders times three ways:
//! - absolute, usually in a `title` attribute: `2024-12-24 19:24:23 +08:00`
//! - calendar dates for old content: `2024 年 12 月 24 日`
//! - relative display text: `3 天前`, `2 小时 5 分钟前`, `刚刚`

use std::sync::LazyLock;

use regex::Regex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::regex;

static ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}(?::\d{2})?)(?:\.\d+)?\s*(Z|[+-]\d{2}:?\d{2})?")
});
static CALENDAR: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日"));

static RELATIVE_UNITS: LazyLock<[(Regex, i64); 4]> = LazyLock::new(|| {
    [
        (regex(r"(\d+)\s*(?:天|days?\b)"), 86_400),
        (regex(r"(\d+)\s*(?:小时|hours?\b)"), 3_600),
        (regex(r"(\d+)\s*(?:分钟|minutes?\b|mins?\b)"), 60),
        (regex(r"(\d+)\s*(?:秒|seconds?\b)"), 1),
    ]
});

const WITH_OFFSET: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
);
const WITHOUT_OFFSET: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Resolves a record's time from an absolute candidate (title attribute)
/// and a display candidate.
///
/// Precedence: absolute or calendar parse of either candidate (title first),
/// then relative parse (display first), then `now`.
#[must_use]
pub fn resolve_timestamp(
    absolute: Option<&str>,
    display: Option<&str>,
    now: i64,
    offset: UtcOffset,
) -> i64 {
    let exact = [absolute, display]
        .into_iter()
        .flatten()
        .find_map(|s| parse_absolute(s, offset).or_else(|| parse_calendar_date(s, offset)));
    if let Some(ts) = exact {
        return ts;
    }
    [display, absolute]
        .into_iter()
        .flatten()
        .find_map(|s| parse_relative(s, now))
        .unwrap_or(now)
}

/// Parses an ISO-like date-time. Strings without an offset are read in
/// `offset`.
#[must_use]
pub fn parse_absolute(s: &str, offset: UtcOffset) -> Option<i64> {
    let caps = ABSOLUTE.captures(s)?;
    let date = caps.get(1)?.as_str();
    let mut clock = caps.get(2)?.as_str().to_string();
    if clock.len() == 5 {
        clock.push_str(":00");
    }

    match caps.get(3).map(|m| m.as_str()) {
        Some(zone) => {
            let zone = match zone {
                "Z" => "+00:00".to_string(),
                z if z.len() == 5 => format!("{}:{}", &z[..3], &z[3..]),
                z => z.to_string(),
            };
            let text = format!("{date} {clock} {zone}");
            OffsetDateTime::parse(&text, WITH_OFFSET)
                .ok()
                .map(OffsetDateTime::unix_timestamp)
        }
        None => {
            let text = format!("{date} {clock}");
            PrimitiveDateTime::parse(&text, WITHOUT_OFFSET)
                .ok()
                .map(|dt| dt.assume_offset(offset).unix_timestamp())
        }
    }
}

/// Parses `YYYY 年 MM 月 DD 日` to midnight in `offset`.
#[must_use]
pub fn parse_calendar_date(s: &str, offset: UtcOffset) -> Option<i64> {
    let caps = CALENDAR.captures(s)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u8 = caps.get(2)?.as_str().parse().ok()?;
    let day: u8 = caps.get(3)?.as_str().parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    Some(date.midnight().assume_offset(offset).unix_timestamp())
}

/// Sums every relative component found in `s` and subtracts from `now`.
///
/// `刚刚` ("just now") resolves to `now`. Strings with no recognisable
/// component return `None`.
#[must_use]
pub fn parse_relative(s: &str, now: i64) -> Option<i64> {
    if s.contains("刚刚") || s.to_ascii_lowercase().contains("just now") {
        return Some(now);
    }
    let mut total: i64 = 0;
    let mut matched = false;
    for (re, unit) in RELATIVE_UNITS.iter() {
        for caps in re.captures_iter(s) {
            let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) else {
                continue;
            };
            total = total.saturating_add(n.saturating_mul(*unit));
            matched = true;
        }
    }
    matched.then(|| now.saturating_sub(total))
}
