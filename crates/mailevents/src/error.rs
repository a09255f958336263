use std::path::PathBuf;
use thiserror::Error;

use crate::events::EventServiceError;
use crate::extractor::ExtractionError;
use crate::history::HistoryError;
use crate::mailbox::MailboxError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum MailEventsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Event service error: {0}")]
    EventService(#[from] EventServiceError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

impl MailEventsError {
    /// Stable, machine-usable reason string for results leaving the crate.
    pub fn reason(&self) -> &'static str {
        match self {
            MailEventsError::Config(_) => "configuration error",
            MailEventsError::Validation(_) => "validation failed",
            MailEventsError::Secret(_) => "secret unavailable",
            MailEventsError::Mailbox(e) => e.reason(),
            MailEventsError::Extraction(e) => e.reason(),
            MailEventsError::History(e) => e.reason(),
            MailEventsError::EventService(e) => e.reason(),
            MailEventsError::Database(_) => "storage failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid date format '{format}': {reason}")]
    InvalidDateFormat { format: String, reason: String },

    #[error("Failed to resolve mailbox password: {0}")]
    Secret(#[from] SecretError),

    #[error("Config store error: {0}")]
    Store(#[from] crate::db::DatabaseError),
}

/// A mailbox configuration update was rejected. The stored configuration is
/// left untouched whenever this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port {0} is out of range (1-65535)")]
    PortOutOfRange(i64),

    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("No mailbox configuration stored and '{0}' was not supplied")]
    MissingField(&'static str),
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        "validation failed"
    }
}

pub type Result<T> = std::result::Result<T, MailEventsError>;
