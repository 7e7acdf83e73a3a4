use crate::config::CopyTuning;
use crate::error::{MigrationError, Result};
use crate::models::{CompletedPartTag, CopyOutcome, CopyStrategy, ObjectHead, PartJob};
use crate::services::lease::{Lease, LeaseManager};
use crate::services::storage::{ObjectRef, ObjectStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Most parts a single multipart write may have.
pub const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Zero-byte objects always take the single-shot path; otherwise the
/// threshold is inclusive toward chunking.
pub fn choose_strategy(size: u64, multipart_threshold: u64) -> CopyStrategy {
    if size > 0 && size >= multipart_threshold {
        CopyStrategy::Chunked
    } else {
        CopyStrategy::SingleShot
    }
}

/// Grows `configured` to the next whole MiB that keeps the part count within
/// `MAX_PARTS`.
pub fn effective_part_size(size: u64, configured: u64) -> u64 {
    if size.div_ceil(configured) <= MAX_PARTS {
        return configured;
    }
    size.div_ceil(MAX_PARTS).div_ceil(MIB) * MIB
}

/// Splits `[0, size)` into contiguous ranges numbered from 1.
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartJob> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut part_number = 1;

    while start < size {
        let end = (start + part_size).min(size);
        parts.push(PartJob {
            part_number,
            range: start..end,
        });
        start = end;
        part_number += 1;
    }

    parts
}

type PartResult = (i32, anyhow::Result<String>);

/// Completion bookkeeping behind the pool's progress and watchdog logs.
struct PartProgress {
    total: usize,
    done: usize,
    last_batch: Instant,
    last_completion: Instant,
}

impl PartProgress {
    fn new(total: usize, now: Instant) -> Self {
        Self {
            total,
            done: 0,
            last_batch: now,
            last_completion: now,
        }
    }

    /// Records one finished part. Every fifth part, and the last one, closes
    /// a batch and returns the time since the previous batch.
    fn complete(&mut self, now: Instant) -> Option<Duration> {
        self.done += 1;
        self.last_completion = now;
        if self.done % 5 != 0 && self.done != self.total {
            return None;
        }
        let since = now.duration_since(self.last_batch);
        self.last_batch = now;
        Some(since)
    }

    fn stalled_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_completion)
    }
}

enum PoolStep {
    Cancelled,
    Stalled,
    Drained,
    Finished(std::result::Result<PartResult, JoinError>),
}

/// Copies objects from the source bucket to the same key in the destination
/// bucket, entirely server-side.
pub struct CopyEngine {
    store: Arc<dyn ObjectStore>,
    leases: Arc<LeaseManager>,
    src_bucket: String,
    dst_bucket: String,
    tuning: CopyTuning,
}

impl CopyEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        leases: Arc<LeaseManager>,
        src_bucket: String,
        dst_bucket: String,
        tuning: CopyTuning,
    ) -> Self {
        Self {
            store,
            leases,
            src_bucket,
            dst_bucket,
            tuning,
        }
    }

    pub async fn copy(
        &self,
        key: &str,
        lease: &mut Lease,
        cancel: &CancellationToken,
    ) -> Result<CopyOutcome> {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        let source = ObjectRef::new(&self.src_bucket, key);
        let dest = ObjectRef::new(&self.dst_bucket, key);
        tracing::info!("Copying: {} -> {}", source, dest);

        let Some(src_head) = self
            .store
            .head_object(&source)
            .await
            .map_err(MigrationError::Storage)?
        else {
            tracing::warn!("  ⚠️  Source object not found (may have been deleted): {}", key);
            return Ok(CopyOutcome::SourceGone);
        };

        tracing::info!(
            "  Size: {} bytes ({:.2} GB)",
            src_head.size,
            src_head.size as f64 / (1024.0 * 1024.0 * 1024.0)
        );

        match self
            .store
            .head_object(&dest)
            .await
            .map_err(MigrationError::Storage)?
        {
            Some(dst_head) if dst_head.same_content(&src_head) => {
                tracing::info!(
                    "  ✅ Destination already has identical object (size={}, etag={}) - skipping",
                    dst_head.size,
                    dst_head.etag
                );
                return Ok(CopyOutcome::Skipped);
            }
            Some(dst_head) => {
                tracing::warn!(
                    "  ⚠️  Destination has different object (size: {} vs {}, etag: {} vs {}) - overwriting",
                    dst_head.size,
                    src_head.size,
                    dst_head.etag,
                    src_head.etag
                );
            }
            None => tracing::info!("  Destination object not found - proceeding with copy"),
        }

        let strategy = choose_strategy(src_head.size, self.tuning.multipart_threshold);
        match strategy {
            CopyStrategy::SingleShot => self.single_shot(&source, &dest, lease, cancel).await?,
            CopyStrategy::Chunked => {
                self.chunked(&source, &dest, &src_head, lease, cancel)
                    .await?
            }
        }

        tracing::info!("  ✅ Copy complete: {}", key);
        Ok(CopyOutcome::Completed(strategy))
    }

    /// Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<CopyOutcome> {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        let dest = ObjectRef::new(&self.dst_bucket, key);
        tracing::info!("Deleting: {}", dest);
        self.store
            .delete_object(&dest)
            .await
            .map_err(MigrationError::Storage)?;
        tracing::info!("  ✅ Delete complete: {}", key);
        Ok(CopyOutcome::Deleted)
    }

    async fn single_shot(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        lease: &mut Lease,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let copy = self.store.copy_object(source, dest, None);
        tokio::pin!(copy);

        let period = self.tuning.watchdog;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("  ⚠️  Shutdown signal received during copy of {}", source.key);
                    return Err(MigrationError::Cancelled);
                }
                res = &mut copy => {
                    return res.map_err(|e| MigrationError::CopyFailed {
                        key: source.key.clone(),
                        reason: format!("{:#}", e),
                    });
                }
                _ = heartbeat.tick() => {
                    self.leases.touch(lease, cancel).await;
                }
            }
        }
    }

    async fn chunked(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        head: &ObjectHead,
        lease: &mut Lease,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let part_size = effective_part_size(head.size, self.tuning.part_size);
        if part_size != self.tuning.part_size {
            tracing::info!(
                "  Part size raised to {} bytes to stay within {} parts",
                part_size,
                MAX_PARTS
            );
        }
        let parts = plan_parts(head.size, part_size);

        tracing::info!("  Using multipart copy (>= {} bytes)", self.tuning.multipart_threshold);
        let upload_id = self
            .store
            .create_multipart_upload(dest)
            .await
            .map_err(MigrationError::Storage)?;

        let transferred = self
            .transfer_parts(source, dest, &upload_id, parts, lease, cancel)
            .await;

        let mut completed = match transferred {
            Ok(completed) => completed,
            Err(e) => {
                self.abort(dest, &upload_id).await;
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            self.abort(dest, &upload_id).await;
            return Err(MigrationError::Cancelled);
        }

        // The store rejects completion with parts out of order.
        completed.sort_by_key(|p| p.part_number);

        if let Err(e) = self
            .store
            .complete_multipart_upload(dest, &upload_id, &completed)
            .await
        {
            self.abort(dest, &upload_id).await;
            return Err(MigrationError::CopyFailed {
                key: source.key.clone(),
                reason: format!("completing multipart upload: {:#}", e),
            });
        }

        Ok(())
    }

    /// Runs every part through a pool of at most `part_concurrency` tasks.
    /// On failure or cancellation the pool is aborted and drained before
    /// returning, so no part request outlives this call.
    async fn transfer_parts(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        parts: Vec<PartJob>,
        lease: &mut Lease,
        cancel: &CancellationToken,
    ) -> Result<Vec<CompletedPartTag>> {
        let total = parts.len();
        let mut queued: VecDeque<PartJob> = parts.into();
        let mut pool: JoinSet<PartResult> = JoinSet::new();
        let mut completed = Vec::with_capacity(total);
        let mut progress = PartProgress::new(total, Instant::now());

        tracing::info!(
            "  Uploading {} parts in parallel (max {} concurrent)...",
            total,
            self.tuning.part_concurrency
        );

        while pool.len() < self.tuning.part_concurrency {
            let Some(part) = queued.pop_front() else { break };
            self.spawn_part(&mut pool, source, dest, upload_id, part);
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => PoolStep::Cancelled,
                joined = tokio::time::timeout(self.tuning.watchdog, pool.join_next()) => match joined {
                    Err(_) => PoolStep::Stalled,
                    Ok(None) => PoolStep::Drained,
                    Ok(Some(finished)) => PoolStep::Finished(finished),
                },
            };

            match step {
                PoolStep::Drained => break,
                PoolStep::Cancelled => {
                    tracing::warn!("  ⚠️  Shutdown signal received during multipart copy");
                    pool.shutdown().await;
                    return Err(MigrationError::Cancelled);
                }
                PoolStep::Stalled => {
                    tracing::warn!(
                        "    Watchdog: {}/{} completed, {} in-flight ({:.0}s no completion)",
                        completed.len(),
                        total,
                        pool.len(),
                        progress.stalled_for(Instant::now()).as_secs_f64()
                    );
                    self.leases.touch(lease, cancel).await;
                }
                PoolStep::Finished(Err(join_error)) => {
                    pool.shutdown().await;
                    return Err(MigrationError::CopyFailed {
                        key: source.key.clone(),
                        reason: format!("part task failed: {}", join_error),
                    });
                }
                PoolStep::Finished(Ok((part_number, Err(e)))) => {
                    tracing::error!("  ❌ Part {} failed: {:#}", part_number, e);
                    pool.shutdown().await;
                    return Err(MigrationError::PartFailed {
                        key: source.key.clone(),
                        part_number,
                        reason: format!("{:#}", e),
                    });
                }
                PoolStep::Finished(Ok((part_number, Ok(etag)))) => {
                    completed.push(CompletedPartTag { part_number, etag });

                    if let Some(since_batch) = progress.complete(Instant::now()) {
                        let done = completed.len();
                        tracing::info!(
                            "    Progress: {}/{} parts ({}%) [{:.1}s since last batch]",
                            done,
                            total,
                            done * 100 / total,
                            since_batch.as_secs_f64()
                        );
                    }

                    self.leases.touch(lease, cancel).await;

                    if cancel.is_cancelled() {
                        continue;
                    }
                    if let Some(part) = queued.pop_front() {
                        self.spawn_part(&mut pool, source, dest, upload_id, part);
                    }
                }
            }
        }

        if completed.len() != total {
            return Err(MigrationError::Cancelled);
        }
        Ok(completed)
    }

    fn spawn_part(
        &self,
        pool: &mut JoinSet<PartResult>,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        part: PartJob,
    ) {
        let store = Arc::clone(&self.store);
        let source = source.clone();
        let dest = dest.clone();
        let upload_id = upload_id.to_string();

        pool.spawn(async move {
            let range = part.range_header();
            let res = store
                .upload_part_copy(&source, &dest, &upload_id, part.part_number, &range)
                .await;
            (part.part_number, res)
        });
    }

    async fn abort(&self, dest: &ObjectRef, upload_id: &str) {
        tracing::warn!("  ⚠️  Aborting multipart upload due to error");
        if let Err(e) = self.store.abort_multipart_upload(dest, upload_id).await {
            tracing::error!(
                "  ❌ Failed to abort multipart upload {} for {}: {:#}",
                upload_id,
                dest,
                e
            );
        }
    }
}
