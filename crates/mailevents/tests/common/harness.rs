//! Test harness for isolated orchestrator runs.
//!
//! `TestHarness` wires an `EmailEventProcessor` to:
//! - an in-memory SQLite database (history, config, events)
//! - `FakeMailbox`, a scripted mailbox with injectable failures
//! - `RecordingEventService`, which stores events and remembers every call

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailevents::config::{ConfigStore, MailboxConfig, SqliteConfigStore};
use mailevents::db::Database;
use mailevents::events::{
    Event, EventService, EventServiceError, NewEvent, RecentEventCounts, SqliteEventService,
};
use mailevents::extractor::EventExtractor;
use mailevents::history::{HistoryStore, ProcessingRecord, SqliteHistoryStore};
use mailevents::ingest::{CancelFlag, EmailEventProcessor};
use mailevents::mailbox::{
    MailboxConnector, MailboxError, MailboxSession, MailboxSummary, MessageSummary,
};

use super::builders::{FakeMessage, MailboxConfigBuilder};

#[derive(Default)]
struct MailboxState {
    messages: Vec<FakeMessage>,
    connect_fails: bool,
    list_fails: bool,
    mark_read_fails: bool,
    fetch_failures: HashSet<String>,
    marked_read: Vec<String>,
    fetched: Vec<String>,
    /// Set once the first body is fetched.
    cancel_on_fetch: Option<CancelFlag>,
}

/// Scripted mailbox. Clones share state.
#[derive(Clone, Default)]
pub struct FakeMailbox {
    state: Arc<Mutex<MailboxState>>,
    connects: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: FakeMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().connect_fails = true;
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().list_fails = true;
    }

    pub fn fail_mark_read(&self) {
        self.state.lock().unwrap().mark_read_fails = true;
    }

    pub fn fail_fetch(&self, message_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fetch_failures
            .insert(message_id.to_string());
    }

    pub fn heal_fetch(&self, message_id: &str) {
        self.state.lock().unwrap().fetch_failures.remove(message_id);
    }

    pub fn cancel_on_fetch(&self, flag: CancelFlag) {
        self.state.lock().unwrap().cancel_on_fetch = Some(flag);
    }

    pub fn marked_read(&self) -> Vec<String> {
        self.state.lock().unwrap().marked_read.clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxConnector for FakeMailbox {
    async fn connect(
        &self,
        _config: &MailboxConfig,
    ) -> Result<Box<dyn MailboxSession>, MailboxError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().connect_fails {
            return Err(MailboxError::Connection(
                "connection refused".to_string(),
            ));
        }
        Ok(Box::new(FakeSession {
            mailbox: self.clone(),
        }))
    }

    async fn probe(&self, _config: &MailboxConfig) -> Result<MailboxSummary, MailboxError> {
        let state = self.state.lock().unwrap();
        if state.connect_fails {
            return Err(MailboxError::Connection(
                "connection refused".to_string(),
            ));
        }
        let total = state.messages.len() as u32;
        Ok(MailboxSummary {
            total_messages: total,
            unread_count: total.saturating_sub(state.marked_read.len() as u32),
        })
    }
}

struct FakeSession {
    mailbox: FakeMailbox,
}

#[async_trait]
impl MailboxSession for FakeSession {
    async fn list_candidates(
        &mut self,
        _folder: &str,
    ) -> Result<Vec<MessageSummary>, MailboxError> {
        let state = self.mailbox.state.lock().unwrap();
        if state.list_fails {
            return Err(MailboxError::Protocol("SEARCH failed".to_string()));
        }
        // Seen messages stay listed, like a folder scanned with unseen_only off.
        Ok(state.messages.iter().map(|m| m.summary.clone()).collect())
    }

    async fn fetch_body(&mut self, message_id: &str) -> Result<Vec<u8>, MailboxError> {
        let mut state = self.mailbox.state.lock().unwrap();
        state.fetched.push(message_id.to_string());
        if let Some(flag) = &state.cancel_on_fetch {
            flag.cancel();
        }
        if state.fetch_failures.contains(message_id) {
            return Err(MailboxError::Fetch {
                message_id: message_id.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        state
            .messages
            .iter()
            .find(|m| m.summary.message_id == message_id)
            .map(|m| m.body.clone())
            .ok_or_else(|| MailboxError::Fetch {
                message_id: message_id.to_string(),
                reason: "message vanished".to_string(),
            })
    }

    async fn mark_read(&mut self, message_id: &str) -> Result<(), MailboxError> {
        let mut state = self.mailbox.state.lock().unwrap();
        if state.mark_read_fails {
            return Err(MailboxError::Flag {
                message_id: message_id.to_string(),
                reason: "read-only mailbox".to_string(),
            });
        }
        state.marked_read.push(message_id.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MailboxError> {
        self.mailbox.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Event service that stores events in SQLite and remembers every creation.
pub struct RecordingEventService {
    inner: SqliteEventService,
    created: Mutex<Vec<Event>>,
    fail_create: AtomicBool,
}

impl RecordingEventService {
    pub fn new(db: Database) -> Self {
        Self {
            inner: SqliteEventService::new(db),
            created: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn created(&self) -> Vec<Event> {
        self.created.lock().unwrap().clone()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventService for RecordingEventService {
    async fn create_event(&self, event: NewEvent) -> Result<Event, EventServiceError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EventServiceError::Rejected(
                "calendar unavailable".to_string(),
            ));
        }
        let event = self.inner.create_event(event).await?;
        self.created.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn find_duplicate(&self, event: &NewEvent) -> Result<Option<i64>, EventServiceError> {
        self.inner.find_duplicate(event).await
    }

    async fn count_recent(
        &self,
        since: DateTime<Utc>,
    ) -> Result<RecentEventCounts, EventServiceError> {
        self.inner.count_recent(since).await
    }
}

/// Isolated environment for orchestrator tests.
pub struct TestHarness {
    pub db: Database,
    pub mailbox: FakeMailbox,
    pub events: Arc<RecordingEventService>,
    pub history: Arc<SqliteHistoryStore>,
    pub config_store: Arc<SqliteConfigStore>,
    pub processor: Arc<EmailEventProcessor>,
}

impl TestHarness {
    /// Harness with the default `MailboxConfigBuilder` configuration stored.
    pub fn new() -> Self {
        Self::with_config(Some(MailboxConfigBuilder::new().build()))
    }

    /// Harness with nothing in the config store.
    pub fn unconfigured() -> Self {
        Self::with_config(None)
    }

    pub fn with_config(config: Option<MailboxConfig>) -> Self {
        Self::build(config, None)
    }

    /// Harness whose passes fetch at most `batch_size` message bodies.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::build(Some(MailboxConfigBuilder::new().build()), Some(batch_size))
    }

    fn build(config: Option<MailboxConfig>, batch_size: Option<usize>) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let config_store = Arc::new(SqliteConfigStore::new(db.clone()));
        if let Some(config) = config {
            config_store
                .save(&config)
                .expect("Failed to store mailbox config");
        }

        let mailbox = FakeMailbox::new();
        let events = Arc::new(RecordingEventService::new(db.clone()));
        let history = Arc::new(SqliteHistoryStore::new(db.clone()));

        let mut processor = EmailEventProcessor::new(
            Arc::new(mailbox.clone()),
            config_store.clone(),
            history.clone(),
            events.clone(),
            EventExtractor::default(),
        );
        if let Some(batch_size) = batch_size {
            processor = processor.with_batch_size(batch_size);
        }
        let processor = Arc::new(processor);

        Self {
            db,
            mailbox,
            events,
            history,
            config_store,
            processor,
        }
    }

    /// All history records, most recent first.
    pub fn history(&self) -> Vec<ProcessingRecord> {
        self.history.query(1000, 0).expect("Failed to query history")
    }

    pub fn record(&self, message_id: &str) -> Option<ProcessingRecord> {
        self.history.find(message_id).expect("Failed to find record")
    }

    pub fn stored_config(&self) -> Option<MailboxConfig> {
        self.config_store.load().expect("Failed to load config")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
