//! Periodic mailbox polling.
//!
//! Runs passes on a background thread with its own current-thread runtime.
//! Manual passes are requested through a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use super::processor::EmailEventProcessor;

pub struct PollScheduler {
    processor: Arc<EmailEventProcessor>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl PollScheduler {
    pub fn new(processor: Arc<EmailEventProcessor>, interval: Duration) -> Self {
        Self {
            processor,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the polling loop. The first pass runs immediately.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> std::io::Result<JoinHandle<()>> {
        let processor = Arc::clone(&self.processor);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        std::thread::Builder::new()
            .name("mailbox-poll".to_string())
            .spawn(move || {
                rt.block_on(async {
                    let mut interval_timer = tokio::time::interval(interval);
                    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = interval_timer.tick() => {},
                            trigger = trigger_rx.recv() => match trigger {
                                Ok(()) => log::info!("Manual mailbox pass triggered"),
                                Err(broadcast::error::RecvError::Lagged(n)) => {
                                    log::debug!("Collapsed {} queued triggers", n);
                                }
                                Err(broadcast::error::RecvError::Closed) => {
                                    log::debug!("Trigger channel closed, polling continues on timer");
                                    interval_timer.tick().await;
                                }
                            },
                        }

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let summary = processor.process_inbox().await;
                        if !summary.errors.is_empty() {
                            log::warn!("Mailbox pass finished with {} error(s)", summary.errors.len());
                        }
                    }
                    log::info!("Mailbox polling stopped");
                });
            })
    }

    /// Signals the loop to stop and cancels a running pass after its
    /// current message.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.processor.cancel_flag().cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
