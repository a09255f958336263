//! Table-driven extraction tests over stored notification messages.

use chrono::NaiveDateTime;

use mailevents::extractor::{EventExtractor, ExtractionContext, ExtractionError, Layout};

/// Expected extraction result for one fixture message.
struct ExtractionCase {
    name: &'static str,
    raw: &'static [u8],
    title: &'static str,
    layout: Layout,
    start: &'static str,
    end: Option<&'static str>,
    location: Option<&'static str>,
    external_event_id: Option<&'static str>,
}

const CASES: &[ExtractionCase] = &[
    ExtractionCase {
        name: "html_invitation",
        raw: include_bytes!("fixtures/messages/invitation_html.eml"),
        title: "Harvest Potluck",
        layout: Layout::Invitation,
        start: "2026-11-08 12:30",
        end: Some("2026-11-08 15:00"),
        location: Some("Community Hall"),
        external_event_id: Some("555000111"),
    },
    ExtractionCase {
        name: "plain_reminder_without_year",
        raw: include_bytes!("fixtures/messages/reminder_plain.eml"),
        title: "Book Swap",
        layout: Layout::Reminder,
        start: "2026-10-20 18:30",
        end: None,
        location: Some("Corner Library"),
        external_event_id: Some("777888999"),
    },
    ExtractionCase {
        name: "update_title_from_body",
        raw: include_bytes!("fixtures/messages/update_generic.eml"),
        title: "Neighborhood Cleanup",
        layout: Layout::Update,
        start: "2026-11-14 09:00",
        end: None,
        location: Some("Riverside Park"),
        external_event_id: None,
    },
];

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

#[test]
fn test_fixture_messages() {
    let extractor = EventExtractor::default();
    for case in CASES {
        let event = extractor
            .extract_message(case.raw, &ExtractionContext::default())
            .unwrap_or_else(|e| panic!("{}: extraction failed: {}", case.name, e));

        assert_eq!(event.title, case.title, "{}: title", case.name);
        assert_eq!(event.layout, case.layout, "{}: layout", case.name);
        assert_eq!(event.start_datetime, dt(case.start), "{}: start", case.name);
        assert_eq!(event.end_datetime, case.end.map(dt), "{}: end", case.name);
        assert_eq!(
            event.location.as_deref(),
            case.location,
            "{}: location",
            case.name
        );
        assert_eq!(
            event.external_event_id.as_deref(),
            case.external_event_id,
            "{}: external id",
            case.name
        );
    }
}

#[test]
fn test_html_part_carries_extra_fields() {
    let event = EventExtractor::default()
        .extract_message(
            include_bytes!("fixtures/messages/invitation_html.eml"),
            &ExtractionContext::default(),
        )
        .unwrap();

    assert_eq!(event.host.as_deref(), Some("Oak Street Neighbors"));
    assert_eq!(event.attendees_going, Some(18));
    assert_eq!(
        event.external_url.as_deref(),
        Some("https://www.facebook.com/events/555000111")
    );
}

#[test]
fn test_message_without_event() {
    let err = EventExtractor::default()
        .extract_message(
            include_bytes!("fixtures/messages/newsletter_no_event.eml"),
            &ExtractionContext::default(),
        )
        .unwrap_err();

    assert_eq!(err, ExtractionError::NoEventFound);
    assert_eq!(err.reason(), "extraction failed");
}

#[test]
fn test_context_subject_wins_over_header() {
    let ctx = ExtractionContext {
        subject: Some("Reminder: Poetry Night is tomorrow"),
        received_at: None,
    };
    let event = EventExtractor::default()
        .extract_message(include_bytes!("fixtures/messages/reminder_plain.eml"), &ctx)
        .unwrap();

    assert_eq!(event.title, "Poetry Night");
}
