use bucket_migrator::config::WorkerConfig;
use bucket_migrator::infrastructure::{aws, queue, signals, storage};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucket_migrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;

    let sdk_config = aws::load_sdk_config(&config.transport).await;
    let store = storage::setup_storage(&sdk_config);
    let work_queue = queue::setup_queue(&sdk_config, &config.queue_url);

    // Setup shutdown token
    let cancel = CancellationToken::new();
    signals::cancel_on_signal(cancel.clone());

    let worker = bucket_migrator::build_worker(config, store, work_queue, cancel);
    let report = worker.run().await;

    info!(
        "🛑 Worker exited ({:?}) after {} polls, {} messages processed.",
        report.exit, report.polls, report.messages_processed
    );
    Ok(())
}
