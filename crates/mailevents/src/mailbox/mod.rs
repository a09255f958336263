//! Mailbox access: listing, fetching and flagging notification messages.

pub mod client;
pub mod error;
pub mod filter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MailboxConfig;

pub use client::{parse_message_id, ImapConnector, MessageKey};
pub use error::MailboxError;
pub use filter::matches;

/// Header-level view of a message, as listed from the folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Dedup key, unique within the mailbox.
    pub message_id: String,
    pub from_address: String,
    pub subject: String,
    pub received_at: Option<DateTime<Utc>>,
}

/// A fully fetched message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub from_address: String,
    pub subject: String,
    pub received_at: Option<DateTime<Utc>>,
    pub body: Vec<u8>,
}

impl RawMessage {
    pub fn from_summary(summary: MessageSummary, body: Vec<u8>) -> Self {
        Self {
            message_id: summary.message_id,
            from_address: summary.from_address,
            subject: summary.subject,
            received_at: summary.received_at,
            body,
        }
    }
}

/// Folder counts reported by a connection test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxSummary {
    pub total_messages: u32,
    pub unread_count: u32,
}

/// Opens mailbox sessions.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connects and authenticates. Bounded by the connector's timeout.
    async fn connect(&self, config: &MailboxConfig)
        -> Result<Box<dyn MailboxSession>, MailboxError>;

    /// Opens a session, reads folder counts read-only, and closes it.
    async fn probe(&self, config: &MailboxConfig) -> Result<MailboxSummary, MailboxError>;
}

/// An authenticated mailbox session.
#[async_trait]
pub trait MailboxSession: Send {
    /// Lists every candidate message in received order. Each call re-scans
    /// the folder; limiting how many bodies get fetched is up to the caller.
    async fn list_candidates(&mut self, folder: &str)
        -> Result<Vec<MessageSummary>, MailboxError>;

    /// Fetches the raw RFC 822 content without setting \Seen.
    async fn fetch_body(&mut self, message_id: &str) -> Result<Vec<u8>, MailboxError>;

    async fn mark_read(&mut self, message_id: &str) -> Result<(), MailboxError>;

    /// Logs out. Errors here are not actionable for callers.
    async fn close(&mut self) -> Result<(), MailboxError>;
}
