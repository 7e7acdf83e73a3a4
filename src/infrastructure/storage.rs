use crate::services::storage::{ObjectStore, S3ObjectStore};
use aws_config::SdkConfig;
use std::sync::Arc;

pub fn setup_storage(sdk_config: &SdkConfig) -> Arc<dyn ObjectStore> {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config).build();
    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Arc::new(S3ObjectStore::new(s3_client))
}
