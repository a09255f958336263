//! Event extraction from notification email bodies.
//!
//! Plain-text and HTML notifications are flattened to lines, the subject
//! decides the layout, and labelled fields, links and dates are pulled from
//! the text. Only a title and a start time are required.

pub mod datetime;
pub mod error;
pub mod html;
pub mod layout;

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use mail_parser::{MessageParser, PartType};
use regex::Regex;
use serde::Serialize;

use crate::config::Settings;

pub use datetime::{DateParser, FoundDate};
pub use error::ExtractionError;
pub use layout::Layout;

/// Header names of which at least one must appear in a raw message's header
/// block.
const MESSAGE_HEADERS: &[&str] = &[
    "from",
    "to",
    "subject",
    "date",
    "received",
    "return-path",
    "message-id",
    "mime-version",
    "content-type",
    "delivered-to",
];

/// An RFC 5322 header field line: printable name without spaces, then `:`.
static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[!-9;-~]+:").unwrap());

/// Structured event data recovered from a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedEvent {
    pub title: String,
    pub description: String,
    pub start_datetime: NaiveDateTime,
    pub end_datetime: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub external_url: Option<String>,
    pub external_event_id: Option<String>,
    pub host: Option<String>,
    pub attendees_going: Option<u32>,
    pub attendees_maybe: Option<u32>,
    pub layout: Layout,
    /// Set when the body was ambiguous and the result deserves a second look.
    pub review_note: Option<String>,
}

/// Message metadata available alongside the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionContext<'a> {
    pub subject: Option<&'a str>,
    /// Anchors dates written without a year. Defaults to now.
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct EventExtractor {
    dates: DateParser,
}

impl Default for EventExtractor {
    fn default() -> Self {
        Self::new(crate::config::default_date_formats())
    }
}

impl EventExtractor {
    pub fn new(date_formats: Vec<String>) -> Self {
        Self {
            dates: DateParser::new(date_formats),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.date_formats.clone())
    }

    /// Extracts an event from a decoded body (plain text or HTML).
    pub fn extract(
        &self,
        body: &str,
        ctx: &ExtractionContext<'_>,
    ) -> Result<ExtractedEvent, ExtractionError> {
        let subject = ctx.subject.map(str::trim).filter(|s| !s.is_empty());
        if body.trim().is_empty() && subject.is_none() {
            return Err(ExtractionError::EmptyBody);
        }

        let (text, heading) = if html::looks_like_html(body) {
            (html::html_to_text(body), html::first_heading(body))
        } else {
            (html::normalize_lines(&html::decode_entities(body)), None)
        };

        let (layout, subject_title) = classify(subject);
        let fields = layout::extract_fields(&text);
        let reference = ctx.received_at.unwrap_or_else(Utc::now).naive_utc();
        let dates = self.dates.find_all(&text, reference);

        let title = subject_title
            .or(heading)
            .or_else(|| layout::first_meaningful_line(&text));
        let first_date = dates.first();

        let (Some(title), Some(first_date)) = (title.as_ref(), first_date) else {
            if title.is_none() && dates.is_empty() && fields.is_empty() {
                return Err(ExtractionError::NoEventFound);
            }
            let mut missing = Vec::new();
            if title.is_none() {
                missing.push("title");
            }
            if dates.is_empty() {
                missing.push("start_datetime");
            }
            return Err(ExtractionError::MissingFields { missing });
        };

        let location = fields.location.clone().or_else(|| {
            (layout == Layout::Reminder)
                .then(|| layout::line_after(&text, first_date.line))
                .flatten()
        });

        Ok(ExtractedEvent {
            title: title.clone(),
            description: fields.description.clone().unwrap_or_default(),
            start_datetime: first_date.start,
            end_datetime: first_date.end,
            location,
            external_url: fields.external_url,
            external_event_id: fields.external_event_id,
            host: fields.host,
            attendees_going: fields.attendees_going,
            attendees_maybe: fields.attendees_maybe,
            layout,
            review_note: ambiguity_note(&dates),
        })
    }

    /// Extracts an event from manually supplied content.
    ///
    /// Content that opens with an RFC 822 header block goes through
    /// [`extract_rfc822`](Self::extract_rfc822); anything else is treated as
    /// an already-decoded body.
    pub fn extract_message(
        &self,
        raw: &[u8],
        ctx: &ExtractionContext<'_>,
    ) -> Result<ExtractedEvent, ExtractionError> {
        if looks_like_rfc822(raw) {
            self.extract_rfc822(raw, ctx)
        } else {
            self.extract(&String::from_utf8_lossy(raw), ctx)
        }
    }

    /// Extracts an event from a raw RFC 822 message, as fetched from a
    /// mailbox.
    ///
    /// The message is MIME-decoded (HTML part preferred) and its
    /// `Subject:`/`Date:` headers fill gaps in `ctx`.
    pub fn extract_rfc822(
        &self,
        raw: &[u8],
        ctx: &ExtractionContext<'_>,
    ) -> Result<ExtractedEvent, ExtractionError> {
        let Some(message) = MessageParser::default().parse(raw) else {
            return self.extract(&String::from_utf8_lossy(raw), ctx);
        };

        let has_html = message
            .parts
            .iter()
            .any(|part| matches!(part.body, PartType::Html(_)));
        let body: Cow<'_, str> = if has_html {
            message.body_html(0)
        } else {
            message.body_text(0)
        }
        .unwrap_or(Cow::Borrowed(""));

        let subject = ctx
            .subject
            .filter(|s| !s.trim().is_empty())
            .or_else(|| message.subject());
        let received_at = ctx.received_at.or_else(|| {
            message
                .date()
                .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
                .map(|d| d.with_timezone(&Utc))
        });

        self.extract(
            &body,
            &ExtractionContext {
                subject,
                received_at,
            },
        )
    }
}

fn classify(subject: Option<&str>) -> (Layout, Option<String>) {
    match subject {
        Some(subject) => layout::classify_subject(&html::decode_entities(subject)),
        None => (Layout::Generic, None),
    }
}

fn ambiguity_note(dates: &[FoundDate]) -> Option<String> {
    let first = dates.first()?;
    let others: Vec<&str> = dates
        .iter()
        .skip(1)
        .filter(|d| d.start != first.start)
        .map(|d| d.raw.as_str())
        .collect();
    if others.is_empty() {
        return None;
    }
    Some(format!(
        "{} date candidates; used '{}', also found: {}",
        others.len() + 1,
        first.raw,
        others.join("; ")
    ))
}

/// True when the content opens with a header block: header field lines and
/// their folded continuations up to the first blank line, including at least
/// one common message header.
fn looks_like_rfc822(raw: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&raw[..raw.len().min(16 * 1024)]);
    let mut known = false;
    for line in head.lines().skip_while(|line| line.trim().is_empty()) {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            continue;
        }
        if !HEADER_LINE.is_match(line) {
            return false;
        }
        let name = line.split(':').next().unwrap_or_default().to_ascii_lowercase();
        known |= MESSAGE_HEADERS.contains(&name.as_str());
    }
    known
}
