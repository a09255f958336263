pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractor;
pub mod history;
pub mod ingest;
pub mod mailbox;
pub mod sanitize;
pub mod secrets;
pub mod telemetry;

pub use api::{clamp_history, AdminApi, ApiResponse};
pub use config::{
    load_settings, ConfigStore, LogFormat, MailboxConfig, MailboxConfigUpdate,
    MaskedMailboxConfig, Settings, SqliteConfigStore,
};
pub use db::Database;
pub use error::{ConfigError, MailEventsError, Result, ValidationError};
pub use events::{Event, EventService, EventStatus, NewEvent, SqliteEventService};
pub use extractor::{EventExtractor, ExtractedEvent, ExtractionContext, ExtractionError};
pub use history::{HistoryError, HistoryStore, ProcessingRecord, ProcessingStatus, SqliteHistoryStore};
pub use ingest::{CancelFlag, EmailEventProcessor, PassError, PassSummary, PollScheduler, UploadOutcome};
pub use mailbox::{
    ImapConnector, MailboxConnector, MailboxError, MailboxSession, MailboxSummary, MessageSummary,
};
pub use secrets::{resolve_secret, PasswordCipher, SecretError};
pub use telemetry::init_tracing;
