use crate::config::ControllerConfig;
use crate::services::compute::{ComputeLauncher, EcsLauncher};
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

pub fn setup_launcher(sdk_config: &SdkConfig, config: &ControllerConfig) -> Arc<dyn ComputeLauncher> {
    info!(
        "🚢 Cluster: {} (task definition: {}, spot:on-demand = {}:{})",
        config.cluster, config.task_definition, config.weights.spot, config.weights.on_demand
    );
    let ecs_client = aws_sdk_ecs::Client::new(sdk_config);
    Arc::new(EcsLauncher::new(
        ecs_client,
        config.cluster.clone(),
        config.task_definition.clone(),
        config.subnets.clone(),
        config.security_groups.clone(),
        config.weights,
    ))
}
