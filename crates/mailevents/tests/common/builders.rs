//! Builders for creating test messages and configurations programmatically.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;

use mailevents::config::MailboxConfig;
use mailevents::mailbox::MessageSummary;

/// UIDVALIDITY used for every scripted message.
pub const UID_VALIDITY: u32 = 7;

pub const FACEBOOK_SENDER: &str = "Facebook <notification@facebookmail.com>";

/// Message id for a scripted message in INBOX.
pub fn message_id(uid: u32) -> String {
    format!("INBOX:{}:{}", UID_VALIDITY, uid)
}

/// Receipt time used by default: Monday 2026-10-19 09:00 UTC.
pub fn received_base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

/// A message as the fake mailbox serves it.
#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub summary: MessageSummary,
    pub body: Vec<u8>,
}

/// Builder for `FakeMessage` instances.
///
/// Text bodies are served as a plain-text RFC 822 message carrying the
/// builder's headers, the way an IMAP server returns `BODY[]`.
pub struct MessageBuilder {
    uid: u32,
    from: String,
    subject: String,
    body: String,
    raw: Option<Vec<u8>>,
    received_at: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    pub fn new(uid: u32) -> Self {
        Self {
            uid,
            from: FACEBOOK_SENDER.to_string(),
            subject: String::new(),
            body: String::new(),
            raw: None,
            received_at: Some(received_base() + chrono::Duration::minutes(uid as i64)),
        }
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Serves `raw` byte for byte instead of a generated message.
    pub fn raw(mut self, raw: &[u8]) -> Self {
        self.raw = Some(raw.to_vec());
        self
    }

    fn rfc822(&self) -> Vec<u8> {
        let mut message = format!("From: {}\r\nSubject: {}\r\n", self.from, self.subject);
        if let Some(at) = self.received_at {
            message.push_str(&format!("Date: {}\r\n", at.to_rfc2822()));
        }
        message.push_str(
            "MIME-Version: 1.0\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: 8bit\r\n\r\n",
        );
        message.push_str(&self.body.replace('\n', "\r\n"));
        message.push_str("\r\n");
        message.into_bytes()
    }

    pub fn received_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.received_at = at;
        self
    }

    pub fn build(self) -> FakeMessage {
        let body = self.raw.clone().unwrap_or_else(|| self.rfc822());
        FakeMessage {
            summary: MessageSummary {
                message_id: message_id(self.uid),
                from_address: self.from,
                subject: self.subject,
                received_at: self.received_at,
            },
            body,
        }
    }
}

pub const FALL_FESTIVAL_BODY: &str = "Jane Doe invited you to Fall Festival\n\
\n\
Saturday, October 24, 2026 at 6:00 PM – 9:00 PM\n\
Location: Millennium Plaza\n\
Description: Pumpkins, cider and live music.\n\
Going: 42 people\n\
Hosted by Downtown Association\n\
View Event: https://www.facebook.com/events/900100200";

/// A valid invitation notification for "Fall Festival".
pub fn fall_festival(uid: u32) -> FakeMessage {
    MessageBuilder::new(uid)
        .subject("Jane Doe invited you to Fall Festival")
        .body(FALL_FESTIVAL_BODY)
        .build()
}

/// A reminder-style notification for "Trivia Night".
pub fn trivia_night(uid: u32) -> FakeMessage {
    MessageBuilder::new(uid)
        .subject("Reminder: Trivia Night is tomorrow")
        .body("Trivia Night\nSaturday, October 31 at 7:00 PM\nThe Rusty Anchor\nView Event")
        .build()
}

/// A notification-looking message with neither a title nor a date.
pub fn malformed(uid: u32) -> FakeMessage {
    MessageBuilder::new(uid)
        .subject("Hi")
        .body("ok\n\n...")
        .build()
}

/// A message from a sender the default filter rejects.
pub fn newsletter(uid: u32) -> FakeMessage {
    MessageBuilder::new(uid)
        .from("Weekly Deals <deals@shop.example>")
        .subject("Big sale: Saturday, October 24, 2026 at 9:00 AM")
        .body("Big Sale\nSaturday, October 24, 2026 at 9:00 AM")
        .build()
}

/// Builder for `MailboxConfig` instances.
pub struct MailboxConfigBuilder {
    config: MailboxConfig,
}

impl MailboxConfigBuilder {
    /// Defaults: TLS on 993, facebookmail sender filter, pending events,
    /// mark-as-read enabled.
    pub fn new() -> Self {
        Self {
            config: MailboxConfig {
                server: "imap.example.com".to_string(),
                port: 993,
                username: "events@example.com".to_string(),
                password: SecretString::from("hunter2"),
                use_tls: true,
                folder: "INBOX".to_string(),
                sender_filter: Some("facebookmail.com".to_string()),
                subject_filter: None,
                auto_approve: false,
                mark_as_read: true,
            },
        }
    }

    pub fn sender_filter(mut self, filter: Option<&str>) -> Self {
        self.config.sender_filter = filter.map(str::to_string);
        self
    }

    pub fn subject_filter(mut self, filter: Option<&str>) -> Self {
        self.config.subject_filter = filter.map(str::to_string);
        self
    }

    pub fn auto_approve(mut self, auto_approve: bool) -> Self {
        self.config.auto_approve = auto_approve;
        self
    }

    pub fn mark_as_read(mut self, mark_as_read: bool) -> Self {
        self.config.mark_as_read = mark_as_read;
        self
    }

    pub fn build(self) -> MailboxConfig {
        self.config
    }
}

impl Default for MailboxConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
