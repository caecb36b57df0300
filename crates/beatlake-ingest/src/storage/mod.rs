//! Snapshot storage in S3-compatible object storage
//!
//! [`Storage`] is a thin wrapper over the S3 client scoped to one bucket.
//! Snapshots are persisted through the [`SnapshotStore`] trait, which has an
//! S3 implementation for real runs and an in-memory one for dry runs and
//! tests.

use crate::error::StorageError;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use tracing::{debug, info, instrument};

pub mod codec;
pub mod config;
pub mod memory;
pub mod snapshot;

pub use config::StorageConfig;
pub use memory::MemorySnapshotStore;
pub use snapshot::{S3SnapshotStore, SaveOutcome, SnapshotStore, PARQUET_CONTENT_TYPE};

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "beatlake-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket when it does not exist yet
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| StorageError::backend(&self.bucket, DisplayErrorContext(e)))?;
                info!("Created bucket");
                Ok(())
            },
            Err(e) => Err(StorageError::backend(&self.bucket, DisplayErrorContext(e))),
        }
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResult, StorageError> {
        let checksum = calculate_sha256(&data);
        let size = data.len();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::backend(key, DisplayErrorContext(e)))?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    /// Fetch an object; `None` when the key does not exist
    #[instrument(skip(self))]
    pub async fn download_optional(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                debug!("No object at s3://{}/{}", self.bucket, key);
                return Ok(None);
            },
            Err(e) => return Err(StorageError::backend(key, DisplayErrorContext(e))),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend(key, e))?
            .into_bytes();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(Some(data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: usize,
}

pub(crate) fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_sha256() {
        let checksum = calculate_sha256(b"Hello, World!");
        assert_eq!(
            checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_bucket_from_config() {
        let storage = Storage::new(StorageConfig::for_minio("http://localhost:9000", "music"));
        assert_eq!(storage.bucket(), "music");
    }
}
