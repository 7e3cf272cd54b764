//! Date phrase recognition and relative date resolution
//!
//! Resolves phrases such as "yesterday", "last Monday", "3 days ago",
//! "4/1/2025" or "April 1st" against a reference date supplied by the caller.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// A date phrase found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub date: NaiveDate,
    /// Byte span of the phrase in the searched text
    pub span: Range<usize>,
}

const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thurs?|thu|fri";

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:(?P<today>today|tonight|this morning|this afternoon)|(?P<yesterday>yesterday|last night)|(?P<ago>\d{{1,3}}|a|one|two|three|four|five|six|seven)\s+days?\s+ago|(?P<lastweek>last week|a week ago)|(?:(?P<qual>last|this past|past|on|this)\s+)?(?P<weekday>{}))\b",
            WEEKDAYS
        ))
        .expect("relative date regex")
    })
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?P<y>\d{4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})\b").expect("iso date regex")
    })
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?P<m>\d{1,2})/(?P<d>\d{1,2})(?:/(?P<y>\d{4}|\d{2}))?\b").expect("slash date regex")
    })
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?P<mon>{})\.?\s+(?P<d>\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(?P<y>\d{{4}}))?\b",
            MONTHS
        ))
        .expect("month day regex")
    })
}

fn day_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?P<d>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<mon>{})\.?(?:,?\s+(?P<y>\d{{4}}))?\b",
            MONTHS
        ))
        .expect("day month regex")
    })
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let key = lower.get(..3)?;
    let n = match key {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn weekday_from(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    let wd = match lower.get(..3)? {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(wd)
}

fn small_number(word: &str) -> Option<i64> {
    match word.to_lowercase().as_str() {
        "a" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        other => other.parse().ok(),
    }
}

fn expand_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    if raw.len() == 2 {
        Some(2000 + y)
    } else {
        Some(y)
    }
}

/// Most recent `target` weekday strictly before `reference` (1..=7 days back)
pub fn previous_weekday(reference: NaiveDate, target: Weekday) -> NaiveDate {
    let current = reference.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut back = (current - wanted).rem_euclid(7);
    if back == 0 {
        back = 7;
    }
    reference - Duration::days(back)
}

/// Most recent `target` weekday on or before `reference`
pub fn recent_weekday(reference: NaiveDate, target: Weekday) -> NaiveDate {
    let current = reference.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    reference - Duration::days((current - wanted).rem_euclid(7))
}

fn resolve_relative(caps: &regex::Captures<'_>, reference: NaiveDate) -> Option<NaiveDate> {
    if caps.name("today").is_some() {
        return Some(reference);
    }
    if caps.name("yesterday").is_some() {
        return Some(reference - Duration::days(1));
    }
    if let Some(n) = caps.name("ago") {
        return Some(reference - Duration::days(small_number(n.as_str())?));
    }
    if caps.name("lastweek").is_some() {
        return Some(reference - Duration::days(7));
    }
    let weekday = weekday_from(caps.name("weekday")?.as_str())?;
    let qualifier = caps.name("qual").map(|q| q.as_str().to_lowercase());
    match qualifier.as_deref() {
        Some("last") | Some("this past") | Some("past") => {
            Some(previous_weekday(reference, weekday))
        }
        _ => Some(recent_weekday(reference, weekday)),
    }
}

type AbsoluteParser = fn(&regex::Captures<'_>, NaiveDate) -> Option<NaiveDate>;

fn iso_date(c: &regex::Captures<'_>, _reference: NaiveDate) -> Option<NaiveDate> {
    let y = c.name("y")?.as_str().parse().ok()?;
    let m = c.name("m")?.as_str().parse().ok()?;
    let d = c.name("d")?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

fn slash_date(c: &regex::Captures<'_>, reference: NaiveDate) -> Option<NaiveDate> {
    let m = c.name("m")?.as_str().parse().ok()?;
    let d = c.name("d")?.as_str().parse().ok()?;
    let y = match c.name("y") {
        Some(y) => expand_year(y.as_str())?,
        None => reference.year(),
    };
    NaiveDate::from_ymd_opt(y, m, d)
}

fn named_month_date(c: &regex::Captures<'_>, reference: NaiveDate) -> Option<NaiveDate> {
    let m = month_number(c.name("mon")?.as_str())?;
    let d = c.name("d")?.as_str().parse().ok()?;
    let y = match c.name("y") {
        Some(y) => y.as_str().parse().ok()?,
        None => reference.year(),
    };
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Absolute date formats in priority order
fn absolute_formats() -> [(&'static Regex, AbsoluteParser); 4] {
    [
        (iso_re(), iso_date),
        (slash_re(), slash_date),
        (month_day_re(), named_month_date),
        (day_month_re(), named_month_date),
    ]
}

/// Find the first date phrase in `text`, resolving it against `reference`
///
/// Absolute dates win over relative phrases when both are present.
pub fn find_date(text: &str, reference: NaiveDate) -> Option<DateMatch> {
    for (re, parse) in absolute_formats() {
        if let Some(c) = re.captures(text) {
            if let Some(date) = parse(&c, reference) {
                return Some(DateMatch {
                    date,
                    span: c.get(0)?.range(),
                });
            }
        }
    }

    let c = relative_re().captures(text)?;
    let date = resolve_relative(&c, reference)?;
    Some(DateMatch {
        date,
        span: c.get(0)?.range(),
    })
}

/// Parse a date written at the start of a statement line
///
/// Returns the date and the remainder of the line after it. Only absolute
/// formats count: "Sun" or "today" opening a statement line is a description.
pub fn parse_leading_date(line: &str, reference: NaiveDate) -> Option<(NaiveDate, &str)> {
    let trimmed = line.trim_start();
    for (re, parse) in absolute_formats() {
        // Leftmost match, so a date at offset 0 is the one returned
        let Some(c) = re.captures(trimmed) else {
            continue;
        };
        let whole = c.get(0)?;
        if whole.start() != 0 {
            continue;
        }
        if let Some(date) = parse(&c, reference) {
            return Some((date, trimmed[whole.end()..].trim()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_yesterday_and_today() {
        let reference = d(2025, 4, 14);
        assert_eq!(find_date("at Target yesterday", reference).unwrap().date, d(2025, 4, 13));
        assert_eq!(find_date("lunch today", reference).unwrap().date, reference);
    }

    #[test]
    fn test_last_weekday_is_strictly_before() {
        // 2025-04-14 is a Monday
        let reference = d(2025, 4, 14);
        assert_eq!(find_date("last Monday", reference).unwrap().date, d(2025, 4, 7));
        assert_eq!(find_date("last friday", reference).unwrap().date, d(2025, 4, 11));
        assert_eq!(find_date("on Monday", reference).unwrap().date, reference);
    }

    #[test]
    fn test_days_ago() {
        let reference = d(2025, 4, 14);
        assert_eq!(find_date("3 days ago", reference).unwrap().date, d(2025, 4, 11));
        assert_eq!(find_date("two days ago", reference).unwrap().date, d(2025, 4, 12));
    }

    #[test]
    fn test_absolute_formats() {
        let reference = d(2025, 4, 14);
        assert_eq!(find_date("on 2025-03-02", reference).unwrap().date, d(2025, 3, 2));
        assert_eq!(find_date("Amazon $40.00 4/1/2025", reference).unwrap().date, d(2025, 4, 1));
        assert_eq!(find_date("on 4/1", reference).unwrap().date, d(2025, 4, 1));
        assert_eq!(find_date("3/9/24", reference).unwrap().date, d(2024, 3, 9));
        assert_eq!(find_date("April 3rd", reference).unwrap().date, d(2025, 4, 3));
        assert_eq!(find_date("Mar 5, 2024", reference).unwrap().date, d(2024, 3, 5));
        assert_eq!(find_date("5 March 2024", reference).unwrap().date, d(2024, 3, 5));
    }

    #[test]
    fn test_span_covers_phrase() {
        let text = "got $500 from Acme Corp last Monday";
        let found = find_date(text, d(2025, 4, 14)).unwrap();
        assert_eq!(&text[found.span], "last Monday");
    }

    #[test]
    fn test_no_date() {
        assert!(find_date("coffee at the corner shop", d(2025, 4, 14)).is_none());
    }

    #[test]
    fn test_leading_statement_date() {
        let reference = d(2025, 4, 14);
        let (date, rest) = parse_leading_date("04/01/2025 AMAZON MKTPLACE", reference).unwrap();
        assert_eq!(date, d(2025, 4, 1));
        assert_eq!(rest, "AMAZON MKTPLACE");
        assert!(parse_leading_date("AMAZON 04/01/2025", reference).is_none());
        assert!(parse_leading_date("Sunday brunch $30", reference).is_none());
    }

    #[test]
    fn test_leading_date_ignores_later_dates_on_the_line() {
        let reference = d(2025, 4, 14);
        let (date, rest) =
            parse_leading_date("04/01/2025 PAYMENT REF 2025-03-15 -$40.00", reference).unwrap();
        assert_eq!(date, d(2025, 4, 1));
        assert_eq!(rest, "PAYMENT REF 2025-03-15 -$40.00");

        let (date, _) = parse_leading_date("  Mar 3 TRANSFER 04/02/2025", reference).unwrap();
        assert_eq!(date, d(2025, 3, 3));
    }
}
