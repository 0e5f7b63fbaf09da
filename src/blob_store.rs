//! S3-backed blob storage for profile images.
//!
//! Images are stored under opaque UUID names; the current name is referenced
//! from the user's directory profile. Read access is granted through
//! time-limited presigned URLs, never through public bucket access.

use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from blob storage
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Failed to create container: {0}")]
    EnsureContainer(String),

    #[error("Failed to upload blob {name}: {message}")]
    Upload { name: String, message: String },

    #[error("Failed to delete blob {name}: {message}")]
    Delete { name: String, message: String },

    #[error("Failed to generate signed URL for {name}: {message}")]
    Presign { name: String, message: String },
}

/// A time-limited read-only URL for one blob
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Abstract blob store operations used by the profile workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the backing container if it does not exist. Idempotent,
    /// called once at startup.
    async fn ensure_container(&self) -> Result<(), BlobError>;

    /// Upload a blob under the given name
    async fn upload(&self, name: &str, data: Bytes, content_type: &str) -> Result<(), BlobError>;

    /// Delete a blob. A missing blob is a benign no-op.
    async fn delete(&self, name: &str) -> Result<(), BlobError>;

    /// Generate a read-only URL valid for `ttl`
    async fn signed_read_url(&self, name: &str, ttl: Duration) -> Result<SignedUrl, BlobError>;
}

/// S3 blob store for profile images
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    region: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 blob store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
        }
    }

    async fn bucket_exists(&self) -> Result<bool, BlobError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(BlobError::EnsureContainer(e.to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self))]
    async fn ensure_container(&self) -> Result<(), BlobError> {
        if self.bucket_exists().await? {
            debug!(bucket = %self.bucket, "Bucket already exists");
            return Ok(());
        }

        let mut create = self.client.create_bucket().bucket(&self.bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            create = create.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        create
            .send()
            .await
            .map_err(|e| BlobError::EnsureContainer(e.to_string()))?;

        info!(bucket = %self.bucket, "Created profile image bucket");
        Ok(())
    }

    #[instrument(skip(self, data), fields(name = %name, size_bytes = data.len()))]
    async fn upload(&self, name: &str, data: Bytes, content_type: &str) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::Upload {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        debug!(name = %name, "Blob uploaded");
        Ok(())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn delete(&self, name: &str) -> Result<(), BlobError> {
        // S3 DeleteObject succeeds for missing keys, which matches the
        // tolerate-not-found contract
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| BlobError::Delete {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        debug!(name = %name, "Blob deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn signed_read_url(&self, name: &str, ttl: Duration) -> Result<SignedUrl, BlobError> {
        let presigning_config =
            PresigningConfig::expires_in(ttl).map_err(|e| BlobError::Presign {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .presigned(presigning_config)
            .await
            .map_err(|e| BlobError::Presign {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(15));

        Ok(SignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }
}

/// Generate a fresh unique blob name for a new profile image
pub fn new_blob_name() -> String {
    uuid::Uuid::new_v4().to_string()
}
