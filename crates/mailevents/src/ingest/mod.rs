//! Ingestion orchestration: mailbox passes, manual uploads and scheduling.

pub mod processor;
pub mod result;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use processor::EmailEventProcessor;
pub use result::{PassError, PassSummary, ProcessingStats, UploadOutcome, STATS_WINDOW_DAYS};
pub use scheduler::PollScheduler;

/// Shared flag checked between messages. Once set, running passes stop after
/// the current message.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
