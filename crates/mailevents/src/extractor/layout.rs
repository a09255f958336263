//! Notification layouts and the labelled fields found in their bodies.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::datetime::contains_date;

static RE_INVITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invited you to\s+(.+)").unwrap());
static RE_REMINDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*Reminder:\s*(.+?)\s+is\b").unwrap());
static RE_STARTING_SOON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Event starting soon:\s*(.+)").unwrap());
static RE_CREATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)You created an event:\s*(.+)").unwrap());
static RE_UPDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)event has been updated").unwrap());

static RE_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*Location:[ \t]*(\S.*?)\s*$").unwrap());
static RE_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Description:\s*(.+?)(?:\n\s*Going|\n\s*Maybe|\n\s*View Event|Location:|\z)")
        .unwrap()
});
static RE_GOING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bGoing:\s*(\d+)\s*(?:people|person)?").unwrap());
static RE_MAYBE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMaybe:\s*(\d+)\s*(?:people|person)?").unwrap());
static RE_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)Hosted by[ \t]+(\S.*?)\s*$").unwrap());
static RE_EVENT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.|m\.|web\.)?facebook\.com/events/(\d+)").unwrap()
});
static RE_SHARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://fb\.me/e/([A-Za-z0-9_-]+)").unwrap());
static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
static RE_FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z ]{0,24}:(\s|$)").unwrap());

/// Lines that never make a title.
const BOILERPLATE: &[&str] = &[
    "view event",
    "facebook",
    "reply",
    "going",
    "maybe",
    "interested",
    "can't go",
    "hi",
    "hello",
];

/// Notification layout, decided from the subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Invitation,
    Reminder,
    Creation,
    Update,
    Generic,
}

/// Classifies a subject and pulls the event title out of it when the layout
/// carries one.
pub fn classify_subject(subject: &str) -> (Layout, Option<String>) {
    let title_from = |re: &Regex| {
        re.captures(subject)
            .and_then(|caps| caps.get(1))
            .map(|m| clean_title(m.as_str()))
            .filter(|t| !t.is_empty())
    };

    if let Some(title) = title_from(&RE_INVITATION) {
        return (Layout::Invitation, Some(title));
    }
    if let Some(title) = title_from(&RE_REMINDER).or_else(|| title_from(&RE_STARTING_SOON)) {
        return (Layout::Reminder, Some(title));
    }
    if let Some(title) = title_from(&RE_CREATION) {
        return (Layout::Creation, Some(title));
    }
    if RE_UPDATE.is_match(subject) {
        return (Layout::Update, None);
    }
    (Layout::Generic, None)
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim_end_matches(['.', '!'])
        .trim()
        .to_string()
}

/// Labelled fields found in a flattened body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyFields {
    pub location: Option<String>,
    pub description: Option<String>,
    pub host: Option<String>,
    pub attendees_going: Option<u32>,
    pub attendees_maybe: Option<u32>,
    pub external_url: Option<String>,
    pub external_event_id: Option<String>,
}

impl BodyFields {
    pub fn is_empty(&self) -> bool {
        *self == BodyFields::default()
    }
}

pub fn extract_fields(text: &str) -> BodyFields {
    let first = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let count = |re: &Regex| first(re).and_then(|n| n.parse::<u32>().ok());

    let (external_url, external_event_id) = match RE_EVENT_URL.captures(text) {
        Some(caps) => (
            Some(format!("https://www.facebook.com/events/{}", &caps[1])),
            Some(caps[1].to_string()),
        ),
        None => match RE_SHARE_URL.captures(text) {
            Some(caps) => (Some(caps[0].to_string()), Some(caps[1].to_string())),
            None => (None, None),
        },
    };

    BodyFields {
        location: first(&RE_LOCATION),
        description: first(&RE_DESCRIPTION),
        host: first(&RE_HOST),
        attendees_going: count(&RE_GOING),
        attendees_maybe: count(&RE_MAYBE),
        external_url,
        external_event_id,
    }
}

/// The first line that reads like a title: longer than three characters and
/// not a URL, a `Label: value` field, a date, or mail boilerplate.
pub fn first_meaningful_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| is_title_candidate(line))
        .map(clean_title)
}

fn is_title_candidate(line: &str) -> bool {
    if line.chars().count() <= 3 || RE_URL.is_match(line) || RE_FIELD_LINE.is_match(line) {
        return false;
    }
    if contains_date(line) || line.to_lowercase().starts_with("hosted by") {
        return false;
    }
    let lowered = line.trim_end_matches(['!', '.', ',']).to_lowercase();
    !BOILERPLATE.contains(&lowered.as_str())
}

/// The first usable line after `line_index`, used as the venue in reminder mail.
pub fn line_after(text: &str, line_index: usize) -> Option<String> {
    text.lines()
        .skip(line_index + 1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| !RE_URL.is_match(line) && !RE_FIELD_LINE.is_match(line))
        .filter(|line| !contains_date(line))
        .map(str::to_string)
}
