use crate::config::CapacityWeights;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, CapacityProviderStrategyItem, DesiredStatus,
    NetworkConfiguration,
};

/// Launches ephemeral worker processes and counts the ones already alive.
#[async_trait]
pub trait ComputeLauncher: Send + Sync {
    /// Workers running or still being provisioned.
    async fn running_workers(&self) -> Result<u32>;

    /// Starts one worker and returns its task identifier.
    async fn launch_worker(&self) -> Result<String>;
}

pub struct EcsLauncher {
    client: Client,
    cluster: String,
    task_definition: String,
    subnets: Vec<String>,
    security_groups: Vec<String>,
    weights: CapacityWeights,
}

impl EcsLauncher {
    pub fn new(
        client: Client,
        cluster: String,
        task_definition: String,
        subnets: Vec<String>,
        security_groups: Vec<String>,
        weights: CapacityWeights,
    ) -> Self {
        Self {
            client,
            cluster,
            task_definition,
            subnets,
            security_groups,
            weights,
        }
    }

    async fn count_tasks(&self, status: DesiredStatus) -> Result<u32> {
        let mut count = 0;
        let mut next_token = None;

        loop {
            let res = self
                .client
                .list_tasks()
                .cluster(&self.cluster)
                .desired_status(status.clone())
                .set_next_token(next_token)
                .send()
                .await?;

            count += res.task_arns().len() as u32;

            match res.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(count)
    }

    fn capacity_strategy(&self) -> Result<Vec<CapacityProviderStrategyItem>> {
        Ok(vec![
            CapacityProviderStrategyItem::builder()
                .capacity_provider("FARGATE_SPOT")
                .weight(self.weights.spot)
                .base(0)
                .build()?,
            CapacityProviderStrategyItem::builder()
                .capacity_provider("FARGATE")
                .weight(self.weights.on_demand)
                .base(0)
                .build()?,
        ])
    }

    fn network_configuration(&self) -> Result<NetworkConfiguration> {
        let security_groups = if self.security_groups.is_empty() {
            None
        } else {
            Some(self.security_groups.clone())
        };

        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(self.subnets.clone()))
            .set_security_groups(security_groups)
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()?;

        Ok(NetworkConfiguration::builder()
            .awsvpc_configuration(vpc)
            .build())
    }
}

#[async_trait]
impl ComputeLauncher for EcsLauncher {
    async fn running_workers(&self) -> Result<u32> {
        let running = self.count_tasks(DesiredStatus::Running).await?;
        let pending = self.count_tasks(DesiredStatus::Pending).await?;
        Ok(running + pending)
    }

    async fn launch_worker(&self) -> Result<String> {
        let res = self
            .client
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .set_capacity_provider_strategy(Some(self.capacity_strategy()?))
            .network_configuration(self.network_configuration()?)
            .enable_execute_command(false)
            .count(1)
            .send()
            .await?;

        if let Some(arn) = res.tasks().first().and_then(|t| t.task_arn()) {
            return Ok(arn.to_string());
        }

        let failures: Vec<String> = res
            .failures()
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.arn().unwrap_or("unknown"),
                    f.reason().unwrap_or("no reason given")
                )
            })
            .collect();

        if failures.is_empty() {
            Err(anyhow!("Unknown error starting task"))
        } else {
            Err(anyhow!("Failed to start task: {}", failures.join("; ")))
        }
    }
}
