pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::WorkerConfig;
use crate::services::copy_engine::CopyEngine;
use crate::services::lease::LeaseManager;
use crate::services::queue::WorkQueue;
use crate::services::storage::ObjectStore;
use crate::services::worker::MigrationWorker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wires a worker from its collaborators. The same token drives the worker
/// loop, the copy engine and every lease extension.
pub fn build_worker(
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    cancel: CancellationToken,
) -> MigrationWorker {
    let leases = Arc::new(LeaseManager::new(
        queue.clone(),
        config.visibility_timeout,
        config.visibility_extend_interval,
    ));
    let engine = CopyEngine::new(
        store,
        leases.clone(),
        config.src_bucket.clone(),
        config.dst_bucket.clone(),
        config.copy.clone(),
    );
    MigrationWorker::new(queue, leases, engine, config, cancel)
}
