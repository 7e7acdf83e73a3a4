use crate::config::{RetryMode, TransportConfig};
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

/// Shared SDK configuration: region, retry policy and timeouts. Transient
/// transport errors are retried here and nowhere else.
pub async fn load_sdk_config(transport: &TransportConfig) -> SdkConfig {
    let retry = match transport.retry_mode {
        RetryMode::Standard => RetryConfig::standard(),
        RetryMode::Adaptive => RetryConfig::adaptive(),
    }
    .with_max_attempts(transport.max_attempts);

    let timeouts = TimeoutConfig::builder()
        .connect_timeout(transport.connect_timeout)
        .read_timeout(transport.read_timeout)
        .build();

    info!(
        "☁️  AWS: region={}, retry={} x{}",
        transport.region, transport.retry_mode, transport.max_attempts
    );

    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(transport.region.clone()))
        .retry_config(retry)
        .timeout_config(timeouts)
        .load()
        .await
}
