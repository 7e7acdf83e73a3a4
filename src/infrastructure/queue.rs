use crate::services::queue::{SqsWorkQueue, WorkQueue};
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

pub fn setup_queue(sdk_config: &SdkConfig, queue_url: &str) -> Arc<dyn WorkQueue> {
    info!("📬 Queue: {}", queue_url);
    let sqs_client = aws_sdk_sqs::Client::new(sdk_config);
    Arc::new(SqsWorkQueue::new(sqs_client, queue_url.to_string()))
}
