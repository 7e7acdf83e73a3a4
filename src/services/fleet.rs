use crate::config::ControllerConfig;
use crate::error::{MigrationError, Result};
use crate::models::ScalingSample;
use crate::services::compute::ComputeLauncher;
use crate::services::queue::WorkQueue;
use std::sync::Arc;

/// Backlog-per-worker sizing with a per-tick burst cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    pub max_workers: u32,
    pub target_backlog_per_worker: u32,
    pub burst_limit: u32,
}

impl ScalingPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            target_backlog_per_worker: config.target_backlog_per_worker,
            burst_limit: config.burst_limit,
        }
    }

    /// Workers to launch this tick:
    /// `clamp(ceil(depth / target) - running, 0, min(max - running, burst))`.
    pub fn decide(&self, sample: &ScalingSample) -> u32 {
        if sample.queue_depth == 0 || sample.running_workers >= self.max_workers {
            return 0;
        }

        let target = u64::from(self.target_backlog_per_worker.max(1));
        let desired = sample.queue_depth.div_ceil(target);
        let gap = desired.saturating_sub(u64::from(sample.running_workers));
        let headroom = (self.max_workers - sample.running_workers).min(self.burst_limit);

        gap.min(u64::from(headroom)) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub sample: ScalingSample,
    pub requested: u32,
    pub launched: Vec<String>,
    /// Set when a launch was rejected and the rest of the tick was skipped.
    pub failure: Option<String>,
}

/// Stateless controller: every tick reads the queue and the fleet afresh.
pub struct FleetController {
    queue: Arc<dyn WorkQueue>,
    launcher: Arc<dyn ComputeLauncher>,
    policy: ScalingPolicy,
}

impl FleetController {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        launcher: Arc<dyn ComputeLauncher>,
        policy: ScalingPolicy,
    ) -> Self {
        Self {
            queue,
            launcher,
            policy,
        }
    }

    pub async fn sample(&self) -> Result<ScalingSample> {
        let depth = self.queue.depth().await.map_err(MigrationError::Queue)?;
        let running_workers = self
            .launcher
            .running_workers()
            .await
            .map_err(|e| MigrationError::Launch(format!("listing workers: {:#}", e)))?;

        Ok(ScalingSample {
            queue_depth: depth.total(),
            running_workers,
        })
    }

    /// Launches up to `count` workers, stopping at the first rejection.
    pub async fn launch(&self, count: u32) -> (Vec<String>, Option<String>) {
        let mut launched = Vec::new();

        for i in 0..count {
            match self.launcher.launch_worker().await {
                Ok(task_id) => {
                    tracing::info!(
                        "  Started task {}/{}: {}",
                        i + 1,
                        count,
                        task_id.rsplit('/').next().unwrap_or(&task_id)
                    );
                    launched.push(task_id);
                }
                Err(e) => {
                    tracing::error!("  Failed to start task {}: {:#}", i + 1, e);
                    return (launched, Some(format!("{:#}", e)));
                }
            }
        }

        (launched, None)
    }

    /// One sample/decide/launch cycle. With `dry_run` nothing is launched.
    pub async fn tick(&self, dry_run: bool) -> Result<TickReport> {
        let sample = self.sample().await?;
        tracing::info!("Queue depth: {} messages", sample.queue_depth);
        tracing::info!(
            "Running tasks: {}/{}",
            sample.running_workers,
            self.policy.max_workers
        );

        let requested = self.policy.decide(&sample);
        if sample.queue_depth == 0 {
            tracing::info!("No messages in queue - no action needed");
        } else if sample.running_workers >= self.policy.max_workers {
            tracing::info!("Already at max capacity ({} tasks)", self.policy.max_workers);
        }

        if requested == 0 || dry_run {
            if dry_run && requested > 0 {
                tracing::info!("Dry run: would start {} task(s)", requested);
            }
            return Ok(TickReport {
                sample,
                requested,
                launched: Vec::new(),
                failure: None,
            });
        }

        tracing::info!("Starting {} task(s)...", requested);
        let (launched, failure) = self.launch(requested).await;

        Ok(TickReport {
            sample,
            requested,
            launched,
            failure,
        })
    }
}
