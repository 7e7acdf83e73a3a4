use crate::error::{MigrationError, Result};
use crate::models::QueueMessage;
use crate::services::queue::WorkQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Exclusive, renewable claim on one received message.
#[derive(Debug)]
pub struct Lease {
    message_id: String,
    receipt: String,
    deadline: Instant,
    last_extend: Instant,
    extensions: u32,
}

impl Lease {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// When the message becomes visible again unless extended.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn extensions(&self) -> u32 {
        self.extensions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Success,
    Failure,
    Cancelled,
}

pub struct LeaseManager {
    queue: Arc<dyn WorkQueue>,
    visibility_timeout: Duration,
    extend_interval: Duration,
}

impl LeaseManager {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        visibility_timeout: Duration,
        extend_interval: Duration,
    ) -> Self {
        Self {
            queue,
            visibility_timeout,
            extend_interval,
        }
    }

    /// Starts tracking a message that was received with the full visibility
    /// timeout.
    pub fn acquire(&self, message: &QueueMessage) -> Lease {
        let now = Instant::now();
        Lease {
            message_id: message.id.clone(),
            receipt: message.receipt.clone(),
            deadline: now + self.visibility_timeout,
            last_extend: now,
            extensions: 0,
        }
    }

    /// Pushes the deadline to `now + visibility_timeout` once `extend_interval`
    /// has passed since the last extension. Returns whether an extension was
    /// made. Never extends after `cancel` fires; extension errors are logged
    /// and swallowed.
    pub async fn touch(&self, lease: &mut Lease, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let now = Instant::now();
        if now.duration_since(lease.last_extend) < self.extend_interval {
            return false;
        }

        match self
            .queue
            .change_visibility(&lease.receipt, self.visibility_timeout)
            .await
        {
            Ok(()) => {
                lease.last_extend = now;
                lease.deadline = now + self.visibility_timeout;
                lease.extensions += 1;
                tracing::info!(
                    message_id = %lease.message_id,
                    "  🔄 Extended visibility timeout by {}s",
                    self.visibility_timeout.as_secs()
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %lease.message_id,
                    "  ⚠️  Failed to extend visibility: {:#}",
                    e
                );
                false
            }
        }
    }

    /// Ends the lease. Only `Success` touches the queue (the message is
    /// deleted); any other outcome leaves the last deadline to govern
    /// redelivery.
    pub async fn release(&self, lease: Lease, outcome: LeaseOutcome) -> Result<()> {
        match outcome {
            LeaseOutcome::Success => {
                self.queue
                    .delete_message(&lease.receipt)
                    .await
                    .map_err(MigrationError::Queue)?;
                tracing::info!(
                    message_id = %lease.message_id,
                    "✅ Message deleted from queue (processed successfully)"
                );
            }
            LeaseOutcome::Cancelled => {
                tracing::warn!(
                    message_id = %lease.message_id,
                    "⚠️  Message NOT deleted - returning to queue due to shutdown"
                );
            }
            LeaseOutcome::Failure => {
                tracing::error!(
                    message_id = %lease.message_id,
                    "❌ Message processing failed - will retry after visibility timeout"
                );
            }
        }
        Ok(())
    }
}
