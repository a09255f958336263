use thiserror::Error;

/// Errors produced when a message body cannot be turned into an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("No recognizable event details in message")]
    NoEventFound,

    /// Some fields were recovered but not the ones an event needs.
    #[error("Missing required field(s): {}", .missing.join(", "))]
    MissingFields { missing: Vec<&'static str> },
}

impl ExtractionError {
    pub fn reason(&self) -> &'static str {
        "extraction failed"
    }
}
