//! Date/time discovery in notification text.
//!
//! Tokens are located by pattern, rebuilt into a canonical spelling
//! ("Saturday, October 24, 2026 6:00 PM", "2026-10-24 18:00") and parsed
//! with the configured chrono formats in order.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Year-less dates roll forward at most this many years looking for a
/// matching weekday.
const MAX_YEAR_ROLL: i32 = 7;

static RE_WRITTEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b
        (?:(?P<weekday>(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*)\.?,?\s+)?
        (?P<month>(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*)\.?\s+
        (?P<day>\d{1,2})(?:st|nd|rd|th)?
        (?:,?\s+(?P<year>\d{4}))?
        ,?\s+(?:at\s+)?
        (?P<time>\d{1,2}:\d{2})\s*(?P<meridiem>[ap]\.?m\b\.?)",
    )
    .unwrap()
});

static RE_ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<date>\d{4}-\d{2}-\d{2})[T ](?P<time>\d{2}:\d{2}(?::\d{2})?)\b").unwrap()
});

static RE_END_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:-|–|—|to|until)\s*(?P<time>\d{1,2}:\d{2})\s*(?P<meridiem>[ap]\.?m\b\.?)?",
    )
    .unwrap()
});

/// A date found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDate {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    /// Zero-based line number of the token.
    pub line: usize,
    /// The token as written.
    pub raw: String,
}

#[derive(Debug)]
struct WrittenToken {
    weekday: Option<&'static str>,
    month: &'static str,
    day: u32,
    year: Option<i32>,
    time: String,
    meridiem: String,
}

impl WrittenToken {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let weekday = match caps.name("weekday") {
            Some(w) => Some(canonical_name(w.as_str(), &WEEKDAYS)?),
            None => None,
        };
        let month = canonical_name(caps.name("month")?.as_str(), &MONTHS)?;
        let day = caps.name("day")?.as_str().parse().ok()?;
        let year = caps.name("year").and_then(|y| y.as_str().parse().ok());
        let time = caps.name("time")?.as_str().to_string();
        let meridiem = normalize_meridiem(caps.name("meridiem")?.as_str());
        Some(Self {
            weekday,
            month,
            day,
            year,
            time,
            meridiem,
        })
    }

    fn render(&self, year: i32, with_weekday: bool) -> String {
        match (self.weekday, with_weekday) {
            (Some(weekday), true) => format!(
                "{}, {} {}, {} {} {}",
                weekday, self.month, self.day, year, self.time, self.meridiem
            ),
            _ => format!(
                "{} {}, {} {} {}",
                self.month, self.day, year, self.time, self.meridiem
            ),
        }
    }
}

/// Parses date tokens with an ordered list of chrono formats.
#[derive(Debug, Clone)]
pub struct DateParser {
    formats: Vec<String>,
}

impl DateParser {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }

    /// Finds every parseable date in document order.
    ///
    /// `reference` anchors tokens written without a year.
    pub fn find_all(&self, text: &str, reference: NaiveDateTime) -> Vec<FoundDate> {
        let mut found: Vec<(usize, FoundDate)> = Vec::new();

        for caps in RE_WRITTEN.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(token) = WrittenToken::from_captures(&caps) else {
                continue;
            };
            let Some(start) = self.parse_written(&token, reference) else {
                log::debug!("Unparseable date token '{}'", whole.as_str());
                continue;
            };
            let end = parse_end_time(&text[whole.end()..], start, Some(&token.meridiem));
            found.push((
                whole.start(),
                FoundDate {
                    start,
                    end,
                    line: line_of(text, whole.start()),
                    raw: whole.as_str().to_string(),
                },
            ));
        }

        for caps in RE_ISO.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if found
                .iter()
                .any(|(pos, f)| *pos <= whole.start() && whole.start() < pos + f.raw.len())
            {
                continue;
            }
            let rendered = format!("{} {}", &caps["date"], &caps["time"]);
            let Some(start) = self.try_formats(&rendered) else {
                continue;
            };
            let end = parse_end_time(&text[whole.end()..], start, None);
            found.push((
                whole.start(),
                FoundDate {
                    start,
                    end,
                    line: line_of(text, whole.start()),
                    raw: whole.as_str().to_string(),
                },
            ));
        }

        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, f)| f).collect()
    }

    fn parse_written(&self, token: &WrittenToken, reference: NaiveDateTime) -> Option<NaiveDateTime> {
        if let Some(year) = token.year {
            return self
                .try_formats(&token.render(year, true))
                .or_else(|| self.try_formats(&token.render(year, false)));
        }

        // Without a year: first year (from the reference on) where the
        // weekday agrees and the date is not already in the past.
        let not_before = reference - Duration::days(1);
        let base = reference.year();
        let roll = |with_weekday: bool| {
            (base..=base + MAX_YEAR_ROLL)
                .filter_map(|year| self.try_formats(&token.render(year, with_weekday)))
                .find(|dt| *dt >= not_before)
        };
        match token.weekday {
            Some(_) => roll(true).or_else(|| roll(false)),
            None => roll(false),
        }
    }

    fn try_formats(&self, rendered: &str) -> Option<NaiveDateTime> {
        self.formats
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(rendered, format).ok())
    }
}

/// True when the line contains something that looks like a date token.
pub fn contains_date(line: &str) -> bool {
    RE_WRITTEN.is_match(line) || RE_ISO.is_match(line)
}

/// Parses "– 9:00 PM", "to 21:00" or "until 9:00 PM" right after a start token.
fn parse_end_time(
    rest: &str,
    start: NaiveDateTime,
    start_meridiem: Option<&str>,
) -> Option<NaiveDateTime> {
    let caps = RE_END_TIME.captures(rest)?;
    let time_text = &caps["time"];
    let meridiem = caps
        .name("meridiem")
        .map(|m| normalize_meridiem(m.as_str()))
        .or_else(|| start_meridiem.map(str::to_string));

    let time = match meridiem {
        Some(m) => NaiveTime::parse_from_str(&format!("{} {}", time_text, m), "%I:%M %p").ok()?,
        None => NaiveTime::parse_from_str(time_text, "%H:%M").ok()?,
    };

    let end = start.date().and_time(time);
    if end <= start {
        Some(end + Duration::days(1))
    } else {
        Some(end)
    }
}

fn canonical_name(word: &str, names: &[&'static str]) -> Option<&'static str> {
    let word = word.to_lowercase();
    names
        .iter()
        .find(|name| word.len() >= 3 && name.to_lowercase().starts_with(&word))
        .copied()
}

fn normalize_meridiem(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_date_formats;

    fn parser() -> DateParser {
        DateParser::new(default_date_formats())
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn reference() -> NaiveDateTime {
        dt("2026-10-19 09:00")
    }

    #[test]
    fn test_weekday_led_with_year() {
        let found = parser().find_all("Saturday, October 24, 2026 at 6:00 PM", reference());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start, dt("2026-10-24 18:00"));
        assert_eq!(found[0].end, None);
    }

    #[test]
    fn test_abbreviations_and_ordinals() {
        let found = parser().find_all("Sat, Oct 24th, 2026 at 6:00 p.m.", reference());
        assert_eq!(found[0].start, dt("2026-10-24 18:00"));

        let found = parser().find_all("Sept 5, 2027 10:30 am", reference());
        assert_eq!(found[0].start, dt("2027-09-05 10:30"));
    }

    #[test]
    fn test_month_led_without_weekday() {
        let found = parser().find_all("When: July 15, 2027 6:00 PM", reference());
        assert_eq!(found[0].start, dt("2027-07-15 18:00"));
    }

    #[test]
    fn test_year_less_uses_reference_year() {
        // October 31, 2026 is a Saturday.
        let found = parser().find_all("Saturday, October 31 at 7:00 PM", reference());
        assert_eq!(found[0].start, dt("2026-10-31 19:00"));
    }

    #[test]
    fn test_year_less_rolls_forward_when_past() {
        // January 9, 2027 is a Saturday; January 9, 2026 is a Friday.
        let found = parser().find_all("Saturday, January 9 at 7:00 PM", reference());
        assert_eq!(found[0].start, dt("2027-01-09 19:00"));

        let found = parser().find_all("March 3 5:00 PM", reference());
        assert_eq!(found[0].start, dt("2027-03-03 17:00"));
    }

    #[test]
    fn test_iso_tokens() {
        let found = parser().find_all("starts 2026-11-02T18:30:00 sharp", reference());
        assert_eq!(found[0].start, dt("2026-11-02 18:30"));

        let found = parser().find_all("2026-11-02 18:30", reference());
        assert_eq!(found[0].start, dt("2026-11-02 18:30"));
    }

    #[test]
    fn test_end_times() {
        let found = parser().find_all(
            "Saturday, October 24, 2026 at 6:00 PM – 9:00 PM",
            reference(),
        );
        assert_eq!(found[0].end, Some(dt("2026-10-24 21:00")));

        let found = parser().find_all("October 24, 2026 10:00 PM until 1:00 AM", reference());
        assert_eq!(found[0].end, Some(dt("2026-10-25 01:00")));

        let found = parser().find_all("2026-10-24 18:00 to 21:30", reference());
        assert_eq!(found[0].end, Some(dt("2026-10-24 21:30")));
    }

    #[test]
    fn test_document_order_and_lines() {
        let text = "Fall Festival\n2026-12-01 10:00\nSaturday, October 24, 2026 at 6:00 PM";
        let found = parser().find_all(text, reference());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].start, dt("2026-12-01 10:00"));
        assert_eq!(found[0].line, 1);
        assert_eq!(found[1].line, 2);
    }

    #[test]
    fn test_custom_formats_only() {
        let parser = DateParser::new(vec!["%Y-%m-%d %H:%M".to_string()]);
        assert!(parser
            .find_all("Saturday, October 24, 2026 at 6:00 PM", reference())
            .is_empty());
        assert_eq!(parser.find_all("2026-10-24 18:00", reference()).len(), 1);
    }

    #[test]
    fn test_rejects_non_dates() {
        assert!(parser().find_all("Marketing 5, 2026 5:00 PM", reference()).is_empty());
        assert!(parser().find_all("February 30, 2026 5:00 PM", reference()).is_empty());
        assert!(parser().find_all("Going: 12 people", reference()).is_empty());
    }

    #[test]
    fn test_contains_date() {
        assert!(contains_date("Saturday, October 24 at 6:00 PM"));
        assert!(contains_date("2026-10-24 18:00"));
        assert!(!contains_date("Fall Festival"));
    }
}
