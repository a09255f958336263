//! The ingestion orchestrator.
//!
//! A pass is sequential: candidates are handled one at a time in received
//! order, and every failure below the connect step is recorded against its
//! message and the pass moves on. A message is claimed in the history store
//! before its event is created, so overlapping passes never create two
//! events for one message; the pass that loses the claim counts it as a
//! duplicate.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{
    ConfigStore, MailboxConfig, MailboxConfigUpdate, MaskedMailboxConfig, Settings,
    SqliteConfigStore,
};
use crate::db::Database;
use crate::error::{ConfigError, MailEventsError};
use crate::events::{EventService, NewEvent, SqliteEventService};
use crate::extractor::{EventExtractor, ExtractionContext};
use crate::history::{
    HistoryError, HistoryStore, ProcessingRecord, ProcessingStatus, SqliteHistoryStore,
};
use crate::mailbox::{
    self, ImapConnector, MailboxConnector, MailboxSession, MailboxSummary, MessageSummary,
    RawMessage,
};
use crate::sanitize::{hash_value, redact_address, truncate_for_log};

use super::result::{PassError, PassSummary, ProcessingStats, UploadOutcome, STATS_WINDOW_DAYS};
use super::CancelFlag;

/// Reason reported when no mailbox configuration is stored.
pub const NOT_CONFIGURED: &str = "mailbox not configured";

/// Reason reported when a message's outcome could not be stored.
const HISTORY_WRITE_FAILED: &str = "history write failed";

/// Messages fetched per pass unless configured otherwise.
const DEFAULT_BATCH_SIZE: usize = 50;

/// Reason reported by the upload path when the event already exists.
pub const DUPLICATE_EVENT: &str = "duplicate event";

/// What happened to one candidate before its record is written.
#[derive(Debug)]
enum MessageOutcome {
    Created {
        event_id: i64,
        review_note: Option<String>,
    },
    /// The event already existed.
    Duplicate { event_id: i64 },
    Failed {
        reason: &'static str,
        detail: String,
        retryable: bool,
    },
}

pub struct EmailEventProcessor {
    connector: Arc<dyn MailboxConnector>,
    config_store: Arc<dyn ConfigStore>,
    history: Arc<dyn HistoryStore>,
    events: Arc<dyn EventService>,
    extractor: EventExtractor,
    cancel: CancelFlag,
    /// Upper bound on messages fetched per pass. Ignored and already
    /// settled messages do not count against it.
    batch_size: usize,
}

impl EmailEventProcessor {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        config_store: Arc<dyn ConfigStore>,
        history: Arc<dyn HistoryStore>,
        events: Arc<dyn EventService>,
        extractor: EventExtractor,
    ) -> Self {
        Self {
            connector,
            config_store,
            history,
            events,
            extractor,
            cancel: CancelFlag::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Wires the SQLite-backed collaborators and the IMAP connector.
    pub fn from_database(db: Database, settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Arc::new(ImapConnector::from_settings(settings)),
            Arc::new(SqliteConfigStore::from_env(db.clone())?),
            Arc::new(SqliteHistoryStore::new(db.clone())),
            Arc::new(SqliteEventService::new(db)),
            EventExtractor::from_settings(settings),
        )
        .with_batch_size(settings.batch_size))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Runs one mailbox pass. Never fails: every problem ends up in the
    /// returned summary.
    pub async fn process_inbox(&self) -> PassSummary {
        let span = info_span!("mailbox_pass", pass_id = %uuid::Uuid::new_v4());
        self.run_pass().instrument(span).await
    }

    async fn run_pass(&self) -> PassSummary {
        let config = match self.config_store.load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                warn!("No mailbox configuration stored, skipping pass");
                return PassSummary::failed(NOT_CONFIGURED);
            }
            Err(e) => {
                error!(error = %e, "Failed to load mailbox configuration");
                return PassSummary::failed("configuration error");
            }
        };

        let mut session = match self.connector.connect(&config).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, server = %config.server, "Mailbox connection failed");
                return PassSummary::failed(e.reason());
            }
        };

        let mut candidates = match session.list_candidates(&config.folder).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, folder = %config.folder, "Failed to list messages");
                close_session(session.as_mut()).await;
                return PassSummary::failed(e.reason());
            }
        };
        candidates.sort_by_key(|summary| summary.received_at);
        info!(
            candidates = candidates.len(),
            folder = %config.folder,
            "Starting mailbox pass"
        );

        let mut pass = PassSummary::default();
        let mut budget = self.batch_size;
        for summary in candidates {
            if self.cancel.is_cancelled() {
                info!("Pass cancelled, remaining messages are left for the next pass");
                pass.cancelled = true;
                break;
            }
            let span = info_span!(
                "message",
                message_id = %summary.message_id,
                from = %redact_address(&summary.from_address),
            );
            self.process_candidate(session.as_mut(), &config, summary, &mut pass, &mut budget)
                .instrument(span)
                .await;
        }

        close_session(session.as_mut()).await;

        info!(
            processed = pass.processed,
            created_events = pass.created_events,
            duplicates = pass.duplicates,
            ignored = pass.ignored,
            deferred = pass.deferred,
            errors = pass.errors.len(),
            "Mailbox pass finished"
        );
        pass
    }

    async fn process_candidate(
        &self,
        session: &mut dyn MailboxSession,
        config: &MailboxConfig,
        summary: MessageSummary,
        pass: &mut PassSummary,
        budget: &mut usize,
    ) {
        if !mailbox::matches(&summary, config) {
            debug!(
                subject = %truncate_for_log(&summary.subject, 80),
                "Message does not match filters"
            );
            pass.ignored += 1;
            return;
        }

        match self.history.has_processed(&summary.message_id) {
            Ok(true) => {
                self.settle_duplicate(&summary, pass);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "History lookup failed");
                pass.errors
                    .push(PassError::for_message(&summary.message_id, e.reason()));
                return;
            }
        }

        if *budget == 0 {
            debug!("Batch is full, leaving message for the next pass");
            pass.deferred += 1;
            return;
        }
        *budget -= 1;

        let placeholder = ProcessingRecord::in_flight(
            &summary.message_id,
            &summary.subject,
            &summary.from_address,
        );
        match self.history.claim(&placeholder) {
            Ok(true) => {}
            Ok(false) => {
                info!("Another pass is handling this message");
                pass.duplicates += 1;
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to claim message");
                pass.errors
                    .push(PassError::for_message(&summary.message_id, e.reason()));
                return;
            }
        }

        let outcome = self.handle_message(session, config, &summary).await;
        let record = build_record(&summary, &outcome);

        let finished = match self.history.transition(ProcessingStatus::Error, &record) {
            Ok(true) => Ok(()),
            Ok(false) => Err("claim record vanished".to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(detail) = finished {
            error!(error = %detail, "Failed to record message outcome");
            if matches!(outcome, MessageOutcome::Created { .. }) {
                pass.created_events += 1;
            }
            pass.errors
                .push(PassError::for_message(&summary.message_id, HISTORY_WRITE_FAILED));
            return;
        }

        match outcome {
            MessageOutcome::Created { event_id, .. } => {
                info!(event_id, "Created event from message");
                pass.processed += 1;
                pass.created_events += 1;
                if config.mark_as_read {
                    if let Err(e) = session.mark_read(&summary.message_id).await {
                        warn!(error = %e, "Failed to mark message as read");
                    }
                }
            }
            MessageOutcome::Duplicate { event_id } => {
                info!(event_id, "Event already exists");
                pass.duplicates += 1;
            }
            MessageOutcome::Failed { reason, detail, .. } => {
                warn!(reason, detail = %detail, "Message failed");
                pass.errors
                    .push(PassError::for_message(&summary.message_id, reason));
            }
        }
    }

    /// Fetch, extract, dedup against existing events and create.
    async fn handle_message(
        &self,
        session: &mut dyn MailboxSession,
        config: &MailboxConfig,
        summary: &MessageSummary,
    ) -> MessageOutcome {
        let message = match session.fetch_body(&summary.message_id).await {
            Ok(body) => RawMessage::from_summary(summary.clone(), body),
            Err(e) => {
                return MessageOutcome::Failed {
                    reason: e.reason(),
                    detail: e.to_string(),
                    retryable: true,
                }
            }
        };

        let ctx = ExtractionContext {
            subject: Some(&message.subject),
            received_at: message.received_at,
        };
        let extracted = match self.extractor.extract_rfc822(&message.body, &ctx) {
            Ok(extracted) => extracted,
            Err(e) => {
                return MessageOutcome::Failed {
                    reason: e.reason(),
                    detail: e.to_string(),
                    retryable: false,
                }
            }
        };
        debug!(
            title = %extracted.title,
            start = %extracted.start_datetime,
            layout = ?extracted.layout,
            "Extracted event"
        );

        let new_event = NewEvent::from_extracted(&extracted, config.auto_approve);
        match self.events.find_duplicate(&new_event).await {
            Ok(Some(event_id)) => return MessageOutcome::Duplicate { event_id },
            Ok(None) => {}
            Err(e) => {
                return MessageOutcome::Failed {
                    reason: e.reason(),
                    detail: e.to_string(),
                    retryable: true,
                }
            }
        }

        match self.events.create_event(new_event).await {
            Ok(event) => MessageOutcome::Created {
                event_id: event.id,
                review_note: extracted.review_note,
            },
            Err(e) => MessageOutcome::Failed {
                reason: e.reason(),
                detail: e.to_string(),
                retryable: true,
            },
        }
    }

    /// A settled message seen again: `processed` becomes `duplicate`, other
    /// statuses are left as they are.
    fn settle_duplicate(&self, summary: &MessageSummary, pass: &mut PassSummary) {
        let record = ProcessingRecord::new(
            &summary.message_id,
            &summary.subject,
            &summary.from_address,
            ProcessingStatus::Duplicate,
        );
        match self.history.transition(ProcessingStatus::Processed, &record) {
            Ok(flipped) => {
                debug!(flipped, "Message already handled");
                pass.duplicates += 1;
            }
            Err(e) => {
                error!(error = %e, "Failed to mark message as duplicate");
                pass.errors
                    .push(PassError::for_message(&summary.message_id, e.reason()));
            }
        }
    }

    /// Runs extraction and event creation on manually supplied content.
    /// No mailbox access and no history record.
    pub async fn process_email_content(&self, raw: &[u8]) -> UploadOutcome {
        let span = info_span!("upload", content = %hash_value(&String::from_utf8_lossy(raw)));
        self.run_upload(raw).instrument(span).await
    }

    async fn run_upload(&self, raw: &[u8]) -> UploadOutcome {
        let auto_approve = match self.config_store.load() {
            Ok(config) => config.is_some_and(|c| c.auto_approve),
            Err(e) => {
                error!(error = %e, "Failed to load mailbox configuration");
                return UploadOutcome::failed("configuration error");
            }
        };

        let extracted = match self
            .extractor
            .extract_message(raw, &ExtractionContext::default())
        {
            Ok(extracted) => extracted,
            Err(e) => {
                info!(error = %e, "Uploaded content has no usable event");
                return UploadOutcome::failed(e.reason());
            }
        };

        let new_event = NewEvent::from_extracted(&extracted, auto_approve);
        match self.events.find_duplicate(&new_event).await {
            Ok(Some(event_id)) => {
                info!(event_id, "Uploaded event already exists");
                return UploadOutcome::failed(DUPLICATE_EVENT);
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Duplicate check failed");
                return UploadOutcome::failed(e.reason());
            }
        }

        match self.events.create_event(new_event).await {
            Ok(event) => {
                info!(event_id = event.id, "Created event from uploaded content");
                UploadOutcome::created(event, extracted.review_note)
            }
            Err(e) => {
                error!(error = %e, "Event creation failed");
                UploadOutcome::failed(e.reason())
            }
        }
    }

    /// The stored configuration with the password masked.
    pub fn get_configuration(&self) -> Result<Option<MaskedMailboxConfig>, ConfigError> {
        Ok(self.config_store.load()?.map(|config| config.masked()))
    }

    /// Merges a partial update into the stored configuration. Nothing is
    /// written when validation fails.
    pub fn update_configuration(
        &self,
        update: &MailboxConfigUpdate,
    ) -> Result<MaskedMailboxConfig, MailEventsError> {
        let current = self.config_store.load()?;
        let merged = MailboxConfig::merge(current.as_ref(), update)?;
        self.config_store.save(&merged)?;
        info!(server = %merged.server, folder = %merged.folder, "Mailbox configuration updated");
        Ok(merged.masked())
    }

    /// Probes the configured mailbox without changing it.
    pub async fn test_connection(&self) -> Result<MailboxSummary, MailEventsError> {
        let config = self
            .config_store
            .load()?
            .ok_or_else(|| ConfigError::Validation {
                message: NOT_CONFIGURED.to_string(),
            })?;
        let summary = self.connector.probe(&config).await?;
        info!(
            total = summary.total_messages,
            unread = summary.unread_count,
            "Mailbox connection test succeeded"
        );
        Ok(summary)
    }

    pub fn get_processing_history(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ProcessingRecord>, HistoryError> {
        self.history.query(limit, offset)
    }

    pub async fn processing_stats(&self) -> Result<ProcessingStats, MailEventsError> {
        let records = self.history.status_counts()?;
        let since = Utc::now() - Duration::days(STATS_WINDOW_DAYS);
        let recent_events = self.events.count_recent(since).await?;
        Ok(ProcessingStats {
            records,
            recent_events,
        })
    }
}

fn build_record(summary: &MessageSummary, outcome: &MessageOutcome) -> ProcessingRecord {
    let base = |status| {
        ProcessingRecord::new(
            &summary.message_id,
            &summary.subject,
            &summary.from_address,
            status,
        )
    };
    match outcome {
        MessageOutcome::Created {
            event_id,
            review_note,
        } => base(ProcessingStatus::Processed)
            .with_event(*event_id)
            .with_review_note(review_note.clone()),
        MessageOutcome::Duplicate { event_id } => {
            base(ProcessingStatus::Duplicate).with_event(*event_id)
        }
        MessageOutcome::Failed {
            reason,
            detail,
            retryable,
        } => base(ProcessingStatus::Error).with_error(format!("{}: {}", reason, detail), *retryable),
    }
}

async fn close_session(session: &mut dyn MailboxSession) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "Mailbox logout failed");
    }
}
