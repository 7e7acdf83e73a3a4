#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bucket_migrator::config::WorkerConfig;
use bucket_migrator::models::{CompletedPartTag, ObjectHead, QueueDepth, QueueMessage, ReceiveOptions};
use bucket_migrator::services::compute::ComputeLauncher;
use bucket_migrator::services::queue::WorkQueue;
use bucket_migrator::services::storage::{ObjectRef, ObjectStore};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const SRC: &str = "src-bucket";
pub const DST: &str = "dst-bucket";

/// Content tag derived from the bytes alone, so an object keeps its tag no
/// matter whether it was written in one request or in parts.
pub fn content_tag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(data)))
}

pub fn patterned_bytes(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
}

struct Upload {
    dest: ObjectRef,
    parts: HashMap<i32, Bytes>,
}

/// Store double that performs copies in memory and records every call.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<ObjectRef, StoredObject>>,
    uploads: Mutex<HashMap<String, Upload>>,
    next_upload: AtomicUsize,

    pub single_copies: AtomicUsize,
    pub part_copies: AtomicUsize,
    pub deletes: AtomicUsize,
    pub aborted: Mutex<Vec<String>>,
    pub completed_orders: Mutex<Vec<Vec<i32>>>,
    pub part_started: Notify,

    part_delays: Mutex<HashMap<i32, Duration>>,
    failing_part: Mutex<Option<i32>>,
    hang_parts: Mutex<bool>,
    hang_single_copy: Mutex<bool>,
    cancel_on_copy: Mutex<Option<(String, CancellationToken)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, data: Bytes) {
        let etag = content_tag(&data);
        self.objects
            .lock()
            .unwrap()
            .insert(
                ObjectRef::new(bucket, key),
                StoredObject {
                    data,
                    etag,
                    content_type: None,
                },
            );
    }

    pub fn put_typed(&self, bucket: &str, key: &str, data: Bytes, content_type: &str) {
        let etag = content_tag(&data);
        self.objects.lock().unwrap().insert(
            ObjectRef::new(bucket, key),
            StoredObject {
                data,
                etag,
                content_type: Some(content_type.to_string()),
            },
        );
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.object(&ObjectRef::new(bucket, key))
            .and_then(|o| o.content_type)
    }

    /// Stores an object under an explicit tag, e.g. to simulate stale content.
    pub fn put_with_tag(&self, bucket: &str, key: &str, data: Bytes, etag: &str) {
        self.objects.lock().unwrap().insert(
            ObjectRef::new(bucket, key),
            StoredObject {
                data,
                etag: etag.to_string(),
                content_type: None,
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&ObjectRef::new(bucket, key))
            .map(|o| o.data.clone())
    }

    pub fn open_uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn delay_part(&self, part_number: i32, delay: Duration) {
        self.part_delays.lock().unwrap().insert(part_number, delay);
    }

    pub fn fail_part(&self, part_number: i32) {
        *self.failing_part.lock().unwrap() = Some(part_number);
    }

    /// Part copies never finish until aborted.
    pub fn hang_parts(&self) {
        *self.hang_parts.lock().unwrap() = true;
    }

    pub fn hang_single_copy(&self) {
        *self.hang_single_copy.lock().unwrap() = true;
    }

    /// Fires `token` as soon as a single-request copy to `key` succeeds.
    pub fn cancel_after_copy(&self, key: &str, token: CancellationToken) {
        *self.cancel_on_copy.lock().unwrap() = Some((key.to_string(), token));
    }

    fn after_single_copy(&self, dest: &ObjectRef) {
        if let Some((key, token)) = self.cancel_on_copy.lock().unwrap().as_ref() {
            if *key == dest.key {
                token.cancel();
            }
        }
    }

    fn object(&self, object: &ObjectRef) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(object).cloned()
    }
}

fn parse_range(range: &str) -> Result<(usize, usize)> {
    let bounds = range
        .strip_prefix("bytes=")
        .ok_or_else(|| anyhow!("bad range {}", range))?;
    let (start, end) = bounds
        .split_once('-')
        .ok_or_else(|| anyhow!("bad range {}", range))?;
    Ok((start.parse()?, end.parse::<usize>()? + 1))
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn head_object(&self, object: &ObjectRef) -> Result<Option<ObjectHead>> {
        Ok(self.object(object).map(|o| ObjectHead {
            size: o.data.len() as u64,
            etag: o.etag,
            content_type: o.content_type,
        }))
    }

    async fn copy_object(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        content_type: Option<&str>,
    ) -> Result<()> {
        let hang = *self.hang_single_copy.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        let mut stored = self
            .object(source)
            .ok_or_else(|| anyhow!("NoSuchKey: {}", source))?;
        if let Some(content_type) = content_type {
            stored.content_type = Some(content_type.to_string());
        }
        self.single_copies.fetch_add(1, Ordering::SeqCst);
        self.after_single_copy(dest);
        self.objects.lock().unwrap().insert(dest.clone(), stored);
        Ok(())
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(object);
        Ok(())
    }

    async fn create_multipart_upload(&self, dest: &ObjectRef) -> Result<String> {
        let id = format!(
            "upload-{}-{}",
            self.next_upload.fetch_add(1, Ordering::SeqCst),
            uuid::Uuid::new_v4()
        );
        self.uploads.lock().unwrap().insert(
            id.clone(),
            Upload {
                dest: dest.clone(),
                parts: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part_copy(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        part_number: i32,
        range: &str,
    ) -> Result<String> {
        self.part_started.notify_one();

        let hang = *self.hang_parts.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        let delay = self.part_delays.lock().unwrap().get(&part_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = *self.failing_part.lock().unwrap();
        if failing == Some(part_number) {
            return Err(anyhow!("InternalError: part {} failed", part_number));
        }

        let stored = self
            .object(source)
            .ok_or_else(|| anyhow!("NoSuchKey: {}", source))?;
        let (start, end) = parse_range(range)?;
        if end > stored.data.len() {
            return Err(anyhow!("InvalidRange: {}", range));
        }
        let chunk = stored.data.slice(start..end);
        let etag = content_tag(&chunk);

        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;
        if &upload.dest != dest {
            return Err(anyhow!("upload {} targets {}", upload_id, upload.dest));
        }
        upload.parts.insert(part_number, chunk);
        self.part_copies.fetch_add(1, Ordering::SeqCst);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        dest: &ObjectRef,
        upload_id: &str,
        parts: &[CompletedPartTag],
    ) -> Result<()> {
        let order: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        self.completed_orders.lock().unwrap().push(order.clone());

        if order.windows(2).any(|w| w[0] >= w[1]) {
            return Err(anyhow!("InvalidPartOrder: {:?}", order));
        }

        let upload = self
            .uploads
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {}", upload_id))?;

        let mut data = Vec::new();
        for part in parts {
            let chunk = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow!("InvalidPart: {}", part.part_number))?;
            if content_tag(chunk) != part.etag {
                return Err(anyhow!("InvalidPart: tag mismatch on {}", part.part_number));
            }
            data.extend_from_slice(chunk);
        }

        self.put(&dest.bucket, &dest.key, Bytes::from(data));
        Ok(())
    }

    async fn abort_multipart_upload(&self, _dest: &ObjectRef, upload_id: &str) -> Result<()> {
        self.uploads.lock().unwrap().remove(upload_id);
        self.aborted.lock().unwrap().push(upload_id.to_string());
        Ok(())
    }
}

/// Queue double: hands out scripted messages and records lease traffic.
#[derive(Default)]
pub struct FakeQueue {
    messages: Mutex<VecDeque<QueueMessage>>,
    failing_receives: AtomicUsize,
    failing_extensions: Mutex<bool>,
    pub depth: Mutex<QueueDepth>,
    pub receive_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub extensions: Mutex<Vec<(String, Duration)>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, id: &str, body: String) {
        self.messages.lock().unwrap().push_back(QueueMessage {
            id: id.to_string(),
            body,
            receipt: format!("receipt-{}", id),
        });
    }

    pub fn fail_next_receives(&self, count: usize) {
        self.failing_receives.store(count, Ordering::SeqCst);
    }

    pub fn fail_extensions(&self) {
        *self.failing_extensions.lock().unwrap() = true;
    }

    pub fn set_depth(&self, visible: u64, in_flight: u64) {
        *self.depth.lock().unwrap() = QueueDepth { visible, in_flight };
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkQueue for FakeQueue {
    async fn receive(&self, options: &ReceiveOptions) -> Result<Vec<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        if self
            .failing_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("ServiceUnavailable"));
        }

        let mut messages = self.messages.lock().unwrap();
        let take = (options.max_messages.max(1) as usize).min(messages.len());
        Ok(messages.drain(..take).collect())
    }

    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<()> {
        let failing = *self.failing_extensions.lock().unwrap();
        if failing {
            return Err(anyhow!("ReceiptHandleIsInvalid"));
        }
        self.extensions
            .lock()
            .unwrap()
            .push((receipt.to_string(), timeout));
        Ok(())
    }

    async fn delete_message(&self, receipt: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(receipt.to_string());
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        Ok(*self.depth.lock().unwrap())
    }
}

/// Launcher double with a configurable number of successful launches.
pub struct FakeLauncher {
    pub running: u32,
    pub succeed_times: Option<usize>,
    pub launched: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(running: u32) -> Self {
        Self {
            running,
            succeed_times: None,
            launched: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(running: u32, successes: usize) -> Self {
        Self {
            succeed_times: Some(successes),
            ..Self::new(running)
        }
    }
}

#[async_trait]
impl ComputeLauncher for FakeLauncher {
    async fn running_workers(&self) -> Result<u32> {
        Ok(self.running)
    }

    async fn launch_worker(&self) -> Result<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.succeed_times.is_some_and(|n| attempt >= n) {
            return Err(anyhow!("Capacity is unavailable at this time"));
        }
        let arn = format!("arn:aws:ecs:us-east-1:123:task/migrate/{}", attempt);
        self.launched.lock().unwrap().push(arn.clone());
        Ok(arn)
    }
}

pub fn record(event_name: &str, bucket: &str, key: &str) -> serde_json::Value {
    serde_json::json!({
        "eventName": event_name,
        "s3": { "bucket": { "name": bucket }, "object": { "key": key } }
    })
}

pub fn notification(records: Vec<serde_json::Value>) -> String {
    serde_json::json!({ "Records": records }).to_string()
}

pub fn created(key: &str) -> serde_json::Value {
    record("ObjectCreated:Put", SRC, key)
}

pub fn removed(key: &str) -> serde_json::Value {
    record("ObjectRemoved:Delete", SRC, key)
}

/// Worker configuration with small parts so chunked copies stay cheap.
pub fn worker_config(extra: &[(&str, &str)]) -> WorkerConfig {
    let mut vars: HashMap<String, String> = [
        ("REGION", "us-east-1"),
        ("SRC_BUCKET", SRC),
        ("DST_BUCKET", DST),
        ("QUEUE_URL", "https://sqs.us-east-1.amazonaws.com/123/migrate"),
        ("MULTIPART_THRESHOLD", "1000"),
        ("PART_SIZE", "256"),
        ("PART_CONCURRENCY", "3"),
        ("EMPTY_POLLS_BEFORE_EXIT", "3"),
        ("WAIT_TIME_SECONDS", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    WorkerConfig::from_lookup(move |name| vars.get(name).cloned()).unwrap()
}
