use crate::models::{CompletedPartTag, ObjectHead};
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, MetadataDirective};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left untouched when a key is embedded in a copy-source header.
const COPY_SOURCE_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `bucket/key` with the key URL-encoded, as copy requests expect.
    pub fn copy_source(&self) -> String {
        format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&self.key, COPY_SOURCE_SAFE)
        )
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Server-side object operations used by the copy engine and the forwarder.
/// Every transfer happens inside the store; no object bytes pass through
/// this process.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn head_object(&self, object: &ObjectRef) -> Result<Option<ObjectHead>>;

    /// Single-request copy that keeps the source's metadata. `content_type`
    /// is sent along with the copy when given.
    async fn copy_object(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        content_type: Option<&str>,
    ) -> Result<()>;

    async fn delete_object(&self, object: &ObjectRef) -> Result<()>;

    /// Opens a multipart write and returns its upload id.
    async fn create_multipart_upload(&self, dest: &ObjectRef) -> Result<String>;

    /// Copies `range` (`bytes=a-b`) of `source` into part `part_number`.
    /// Returns the part's content tag.
    async fn upload_part_copy(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        part_number: i32,
        range: &str,
    ) -> Result<String>;

    /// `parts` must be in ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        dest: &ObjectRef,
        upload_id: &str,
        parts: &[CompletedPartTag],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, dest: &ObjectRef, upload_id: &str) -> Result<()>;
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, object: &ObjectRef) -> Result<Option<ObjectHead>> {
        let res = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await;

        match res {
            Ok(head) => Ok(Some(ObjectHead {
                size: head.content_length().unwrap_or(0).max(0) as u64,
                etag: head.e_tag().unwrap_or_default().to_string(),
                content_type: head.content_type().map(str::to_string),
            })),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn copy_object(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        content_type: Option<&str>,
    ) -> Result<()> {
        let res = self
            .client
            .copy_object()
            .copy_source(source.copy_source())
            .bucket(&dest.bucket)
            .key(&dest.key)
            .metadata_directive(MetadataDirective::Copy)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 copy_object failed: source={}, dest={}, error={:?}",
                source,
                dest,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await?;
        Ok(())
    }

    async fn create_multipart_upload(&self, dest: &ObjectRef) -> Result<String> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .send()
            .await?;

        res.upload_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))
    }

    async fn upload_part_copy(
        &self,
        source: &ObjectRef,
        dest: &ObjectRef,
        upload_id: &str,
        part_number: i32,
        range: &str,
    ) -> Result<String> {
        let res = self
            .client
            .upload_part_copy()
            .copy_source(source.copy_source())
            .copy_source_range(range)
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .send()
            .await?;

        res.copy_part_result()
            .and_then(|r| r.e_tag())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No ETag for part {}", part_number))
    }

    async fn complete_multipart_upload(
        &self,
        dest: &ObjectRef,
        upload_id: &str,
        parts: &[CompletedPartTag],
    ) -> Result<()> {
        let completed_parts = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .e_tag(&p.etag)
                    .part_number(p.part_number)
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, dest: &ObjectRef, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&dest.bucket)
            .key(&dest.key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }
}
