//! Mailbox access error types.

use thiserror::Error;

/// Errors that can occur while talking to the mailbox server.
#[derive(Error, Debug)]
pub enum MailboxError {
    /// Could not reach or log in to the server (DNS, TCP, TLS, credentials).
    #[error("Mailbox connection failed: {0}")]
    Connection(String),

    /// An operation exceeded the configured timeout.
    #[error("Mailbox {operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// A message body could not be retrieved.
    #[error("Failed to fetch message {message_id}: {reason}")]
    Fetch { message_id: String, reason: String },

    /// Setting the \Seen flag failed.
    #[error("Failed to mark message {message_id} as read: {reason}")]
    Flag { message_id: String, reason: String },

    /// The configured folder does not exist.
    #[error("Mailbox folder '{0}' not found")]
    FolderNotFound(String),

    /// Unexpected protocol response.
    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    /// The mailbox configuration cannot be used to connect.
    #[error("Invalid mailbox configuration: {0}")]
    Config(String),
}

impl MailboxError {
    /// Stable reason string surfaced in pass results.
    pub fn reason(&self) -> &'static str {
        match self {
            MailboxError::Fetch { .. } => "fetch failed",
            MailboxError::Flag { .. } => "mark read failed",
            MailboxError::Timeout {
                operation: "fetch", ..
            } => "fetch failed",
            MailboxError::Timeout {
                operation: "mark_read",
                ..
            } => "mark read failed",
            _ => "connection failed",
        }
    }
}

impl From<async_native_tls::Error> for MailboxError {
    fn from(err: async_native_tls::Error) -> Self {
        MailboxError::Connection(format!("TLS handshake failed: {}", err))
    }
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;
