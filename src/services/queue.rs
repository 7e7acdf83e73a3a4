use crate::models::{QueueDepth, QueueMessage, ReceiveOptions};
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::QueueAttributeName;
use std::time::Duration;

/// The work queue. Its visibility timeout is the only coordination primitive
/// shared between workers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Long-polls for up to `max_messages`; an empty vector means the wait
    /// elapsed with nothing to deliver.
    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>>;

    /// Hides the message for `timeout` from now.
    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<()>;

    async fn delete_message(&self, receipt: &str) -> Result<()>;

    async fn depth(&self) -> Result<QueueDepth>;
}

pub struct SqsWorkQueue {
    client: Client,
    queue_url: String,
}

impl SqsWorkQueue {
    pub fn new(client: Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

fn secs_i32(d: Duration) -> i32 {
    i32::try_from(d.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl WorkQueue for SqsWorkQueue {
    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>> {
        let res = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(options.max_messages)
            .wait_time_seconds(secs_i32(options.wait_time))
            .visibility_timeout(secs_i32(options.visibility_timeout))
            .send()
            .await?;

        let mut messages = Vec::new();
        for msg in res.messages() {
            let Some(receipt) = msg.receipt_handle() else {
                tracing::warn!("Dropping message without receipt handle: {:?}", msg.message_id());
                continue;
            };
            messages.push(QueueMessage {
                id: msg.message_id().unwrap_or_default().to_string(),
                body: msg.body().unwrap_or_default().to_string(),
                receipt: receipt.to_string(),
            });
        }
        Ok(messages)
    }

    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(secs_i32(timeout))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_message(&self, receipt: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await?;
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let res = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await?;

        let count = |name: QueueAttributeName| -> u64 {
            res.attributes()
                .and_then(|attrs| attrs.get(&name))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };

        Ok(QueueDepth {
            visible: count(QueueAttributeName::ApproximateNumberOfMessages),
            in_flight: count(QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
        })
    }
}
