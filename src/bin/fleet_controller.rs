use bucket_migrator::config::ControllerConfig;
use bucket_migrator::infrastructure::{aws, compute, queue};
use bucket_migrator::services::fleet::{FleetController, ScalingPolicy};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Launches migration workers to match queue backlog", long_about = None)]
struct Args {
    /// Sample and decide, but launch nothing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucket_migrator=info,fleet_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ControllerConfig::from_env()?;
    info!("Checking queue: {}", config.queue_url);

    let sdk_config = aws::load_sdk_config(&config.transport).await;
    let controller = FleetController::new(
        queue::setup_queue(&sdk_config, &config.queue_url),
        compute::setup_launcher(&sdk_config, &config),
        ScalingPolicy::from_config(&config),
    );

    let report = controller.tick(args.dry_run).await?;

    info!(
        queue_depth = report.sample.queue_depth,
        running = report.sample.running_workers,
        requested = report.requested,
        started = report.launched.len(),
        "Started {} task(s)",
        report.launched.len()
    );
    if let Some(reason) = report.failure {
        warn!("⚠️  Launches halted for this tick: {}", reason);
    }
    Ok(())
}
