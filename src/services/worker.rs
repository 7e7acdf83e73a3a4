use crate::config::WorkerConfig;
use crate::models::{ChangeEvent, EventKind, QueueMessage, ReceiveOptions};
use crate::services::copy_engine::CopyEngine;
use crate::services::lease::{Lease, LeaseManager, LeaseOutcome};
use crate::services::queue::WorkQueue;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue stayed empty for the configured number of polls.
    Drained,
    /// A shutdown signal arrived.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub exit: WorkerExit,
    pub polls: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
}

/// Drains the migration queue one message at a time.
pub struct MigrationWorker {
    queue: Arc<dyn WorkQueue>,
    leases: Arc<LeaseManager>,
    engine: CopyEngine,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl MigrationWorker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        leases: Arc<LeaseManager>,
        engine: CopyEngine,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            leases,
            engine,
            config,
            cancel,
        }
    }

    pub async fn run(&self) -> WorkerReport {
        self.log_startup();

        let options = ReceiveOptions {
            max_messages: 1,
            wait_time: self.config.wait_time,
            visibility_timeout: self.config.visibility_timeout,
        };
        let mut report = WorkerReport {
            exit: WorkerExit::Cancelled,
            polls: 0,
            messages_processed: 0,
            messages_failed: 0,
        };
        let mut consecutive_empty_polls = 0;

        loop {
            if self.cancel.is_cancelled() {
                report.exit = WorkerExit::Cancelled;
                break;
            }

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    report.exit = WorkerExit::Cancelled;
                    break;
                }
                res = self.queue.receive(&options) => res,
            };
            report.polls += 1;

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!("❌ Unexpected error in worker loop: {:#}", e);
                    tokio::select! {
                        _ = self.cancel.cancelled() => {}
                        _ = sleep(LOOP_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                consecutive_empty_polls += 1;
                tracing::info!(
                    "No messages (empty poll {}/{})...",
                    consecutive_empty_polls,
                    self.config.empty_polls_before_exit
                );

                if consecutive_empty_polls >= self.config.empty_polls_before_exit {
                    tracing::info!(
                        "✅ Queue empty after {} consecutive polls",
                        consecutive_empty_polls
                    );
                    report.exit = WorkerExit::Drained;
                    break;
                }
                continue;
            }

            consecutive_empty_polls = 0;

            for message in messages {
                match self.handle_message(message).await {
                    LeaseOutcome::Success => report.messages_processed += 1,
                    LeaseOutcome::Failure => report.messages_failed += 1,
                    LeaseOutcome::Cancelled => {}
                }
            }
        }

        tracing::info!(
            "👋 Worker shutting down ({:?}): processed {} messages, {} failed",
            report.exit,
            report.messages_processed,
            report.messages_failed
        );
        report
    }

    /// Processes one message under a lease and settles it: deleted on full
    /// success, otherwise left to reappear after its deadline.
    #[tracing::instrument(skip_all, fields(message_id = %message.id))]
    pub async fn handle_message(&self, message: QueueMessage) -> LeaseOutcome {
        tracing::info!("Received message: {}", message.id);

        let mut lease = self.leases.acquire(&message);
        let mut outcome = self.process_message(&message, &mut lease).await;

        // Work finished after the shutdown signal is still not acknowledged.
        if outcome == LeaseOutcome::Success && self.cancel.is_cancelled() {
            outcome = LeaseOutcome::Cancelled;
        }

        if let Err(e) = self.leases.release(lease, outcome).await {
            tracing::error!("❌ Failed to settle message {}: {}", message.id, e);
            return LeaseOutcome::Failure;
        }
        outcome
    }

    async fn process_message(&self, message: &QueueMessage, lease: &mut Lease) -> LeaseOutcome {
        let events = match ChangeEvent::parse_batch(&message.body) {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("❌ Error processing message: {}", e);
                return LeaseOutcome::Failure;
            }
        };

        for event in events {
            if self.cancel.is_cancelled() {
                tracing::warn!("⚠️  Shutdown signal received, stopping message processing");
                return LeaseOutcome::Cancelled;
            }

            if event.bucket != self.config.src_bucket {
                tracing::info!("Skipping event from different bucket: {}", event.bucket);
                continue;
            }

            if !self.config.key_matches(&event.key) {
                tracing::info!("Skipping key outside prefix filter: {}", event.key);
                continue;
            }

            let result = match &event.kind {
                EventKind::Created => {
                    tracing::info!("Processing event: created for key: {}", event.key);
                    self.engine.copy(&event.key, lease, &self.cancel).await
                }
                EventKind::Removed => {
                    tracing::info!("Processing event: removed for key: {}", event.key);
                    self.engine.delete(&event.key, &self.cancel).await
                }
                EventKind::Unknown(name) => {
                    tracing::warn!("Unknown event type: {}", name);
                    continue;
                }
            };

            match result {
                Ok(outcome) => {
                    tracing::debug!(sequence = event.sequence, "Event resolved: {:?}", outcome);
                }
                Err(e) if e.is_cancelled() => return LeaseOutcome::Cancelled,
                Err(e) => {
                    tracing::error!("  ❌ {}", e);
                    return LeaseOutcome::Failure;
                }
            }
        }

        LeaseOutcome::Success
    }

    fn log_startup(&self) {
        let c = &self.config;
        tracing::info!("🚀 Worker starting...");
        tracing::info!("  Region: {}", c.transport.region);
        tracing::info!("  Source bucket: {}", c.src_bucket);
        tracing::info!("  Destination bucket: {}", c.dst_bucket);
        tracing::info!("  Queue URL: {}", c.queue_url);
        tracing::info!(
            "  Prefix filter: {}",
            c.prefix_filter.as_deref().unwrap_or("<all>")
        );
        tracing::info!("  Visibility timeout: {}s", c.visibility_timeout.as_secs());
        tracing::info!("  Long poll wait time: {}s", c.wait_time.as_secs());
        tracing::info!("  Empty polls before exit: {}", c.empty_polls_before_exit);
        tracing::info!(
            "  Visibility extend interval: {}s",
            c.visibility_extend_interval.as_secs()
        );
        tracing::info!(
            "  Multipart threshold: {} bytes, part size: {} bytes, {} parts in flight",
            c.copy.multipart_threshold,
            c.copy.part_size,
            c.copy.part_concurrency
        );
        tracing::info!(
            "  Retry mode: {} ({} attempts)",
            c.transport.retry_mode,
            c.transport.max_attempts
        );
    }
}
