//! Document blob storage
//!
//! The extraction worker only reads blobs, keyed by the filename carried in
//! the intake message. [`Storage`] talks to MinIO (or any S3 endpoint);
//! [`MemoryBlobStore`] keeps blobs in a map for tests.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use config::StorageConfig;
pub use memory::MemoryBlobStore;

#[derive(Error, Debug)]
pub enum BlobError {
    /// The key does not exist in the bucket. Retrying will not help.
    #[error("Blob '{key}' not found")]
    NotFound { key: String },

    #[error("Blob store request for '{key}' failed: {message}")]
    Transport { key: String, message: String },
}

impl BlobError {
    pub fn transport(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Read access to stored document bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}

/// S3-compatible blob store client
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
            "paperless-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket when it does not exist yet.
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self) -> Result<(), BlobError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| BlobError::transport(&self.bucket, e))?;

        info!(bucket = %self.bucket, "Created bucket");
        Ok(())
    }

    /// Store an object. The upload endpoint owns this in production; the
    /// pipeline uses it for seeding and integration tests.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| BlobError::transport(key, e))?;

        debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for Storage {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|service| service.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    BlobError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    BlobError::transport(key, aws_sdk_s3::error::DisplayErrorContext(&e))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| BlobError::transport(key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }
}
