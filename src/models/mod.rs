use serde::Deserialize;
use std::ops::Range;
use std::time::Duration;

use crate::utils::keys::decode_key;

/// Storage-change notification document as delivered in a queue message body.
#[derive(Debug, Deserialize)]
pub struct Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: NotificationEntity,
}

#[derive(Debug, Deserialize)]
pub struct NotificationEntity {
    pub bucket: NotificationBucket,
    pub object: NotificationObject,
}

#[derive(Debug, Deserialize)]
pub struct NotificationBucket {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationObject {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Removed,
    Unknown(String),
}

impl EventKind {
    pub fn from_event_name(name: &str) -> Self {
        if name.starts_with("ObjectCreated:") {
            EventKind::Created
        } else if name.starts_with("ObjectRemoved:") {
            EventKind::Removed
        } else {
            EventKind::Unknown(name.to_string())
        }
    }
}

/// One change decoded from a notification. `key` is already percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub bucket: String,
    pub key: String,
    pub sequence: usize,
}

impl ChangeEvent {
    /// Decodes every record of a message body, in order.
    pub fn parse_batch(body: &str) -> Result<Vec<ChangeEvent>, serde_json::Error> {
        let notification: Notification = serde_json::from_str(body)?;
        Ok(notification
            .records
            .into_iter()
            .enumerate()
            .map(|(sequence, record)| ChangeEvent {
                kind: EventKind::from_event_name(&record.event_name),
                bucket: record.s3.bucket.name,
                key: decode_key(&record.s3.object.key),
                sequence,
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    pub receipt: String,
}

/// Size and content tag of a stored object, as returned by a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub etag: String,
    pub content_type: Option<String>,
}

impl ObjectHead {
    pub fn same_content(&self, other: &ObjectHead) -> bool {
        self.size == other.size && self.etag == other.etag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    SingleShot,
    Chunked,
}

/// How a single change resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed(CopyStrategy),
    Skipped,
    SourceGone,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartJob {
    pub part_number: i32,
    pub range: Range<u64>,
}

impl PartJob {
    /// HTTP byte-range header value (inclusive end).
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.range.start, self.range.end - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartTag {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingSample {
    pub queue_depth: u64,
    pub running_workers: u32,
}

/// What a queue reports about its backlog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: u64,
    pub in_flight: u64,
}

impl QueueDepth {
    pub fn total(&self) -> u64 {
        self.visible + self.in_flight
    }
}

/// Parameters for a receive call.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    pub max_messages: i32,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
}
