use crate::models::{ChangeEvent, EventKind};
use crate::services::storage::{ObjectRef, ObjectStore};
use crate::utils::keys::{file_name, is_directory_marker};
use anyhow::{Result, anyhow};
use std::sync::Arc;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForwardReport {
    pub copied: Vec<String>,
    pub skipped: usize,
}

/// Copies newly created objects into a second bucket under a flat ingest
/// prefix. Store errors are returned as-is; there is no local retry.
pub struct Forwarder {
    store: Arc<dyn ObjectStore>,
    dst_bucket: String,
    ingest_prefix: String,
}

impl Forwarder {
    pub fn new(store: Arc<dyn ObjectStore>, dst_bucket: String, ingest_prefix: String) -> Self {
        Self {
            store,
            dst_bucket,
            ingest_prefix,
        }
    }

    /// `None` for directory markers, which are never forwarded.
    pub fn destination_key(&self, source_key: &str) -> Option<String> {
        if is_directory_marker(source_key) {
            return None;
        }
        Some(format!("{}{}", self.ingest_prefix, file_name(source_key)))
    }

    pub async fn forward(&self, notification: &str) -> Result<ForwardReport> {
        let mut report = ForwardReport::default();

        for event in ChangeEvent::parse_batch(notification)? {
            if event.kind != EventKind::Created {
                tracing::info!("Skipping non-create event for {}", event.key);
                report.skipped += 1;
                continue;
            }

            let Some(dst_key) = self.destination_key(&event.key) else {
                tracing::info!("Skipping directory marker: {}", event.key);
                report.skipped += 1;
                continue;
            };

            let source = ObjectRef::new(&event.bucket, &event.key);
            let dest = ObjectRef::new(&self.dst_bucket, dst_key);
            tracing::info!("Syncing: {} -> {}", source, dest);

            let head = self
                .store
                .head_object(&source)
                .await?
                .ok_or_else(|| anyhow!("source object not found: {}", source))?;

            let content_type = head
                .content_type
                .as_deref()
                .unwrap_or(DEFAULT_CONTENT_TYPE);
            self.store
                .copy_object(&source, &dest, Some(content_type))
                .await?;

            tracing::info!(
                size = head.size,
                content_type,
                "Successfully copied to {}",
                dest
            );
            report.copied.push(dest.key);
        }

        Ok(report)
    }
}
