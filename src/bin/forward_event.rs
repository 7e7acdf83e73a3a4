use bucket_migrator::config::ForwarderConfig;
use bucket_migrator::infrastructure::{aws, storage};
use bucket_migrator::services::forwarder::Forwarder;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Forwards created objects into the ingest bucket", long_about = None)]
struct Args {
    /// Notification document to apply (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucket_migrator=info,forward_event=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ForwarderConfig::from_env()?;

    let notification = match &args.input {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let sdk_config = aws::load_sdk_config(&config.transport).await;
    let forwarder = Forwarder::new(
        storage::setup_storage(&sdk_config),
        config.dst_bucket,
        config.ingest_prefix,
    );

    let report = forwarder.forward(&notification).await?;
    info!(
        "Successfully processed {} records ({} skipped)",
        report.copied.len() + report.skipped,
        report.skipped
    );
    Ok(())
}
