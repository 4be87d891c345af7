//! Object-storage client: the S3-compatible contract the core consumes (presign,
//! HEAD, streamed GET, DELETE). Deliberately narrower than a general storage
//! abstraction (no multi-backend support) since the backend is out of scope per spec §1.

use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::config::DynAppConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct ObjectMetadata {
    pub content_length: i64,
}

/// Thread-safe singleton wrapping the AWS SDK S3 client, per the design note's
/// "object-storage client is a shared, thread-safe singleton".
#[derive(Clone)]
pub struct ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn from_config(config: &DynAppConfig) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.s3_region.clone()));

        if let (Some(key), Some(secret)) = (
            config.s3_access_key_id.clone(),
            config.s3_secret_access_key.clone(),
        ) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key, secret, None, None, "ifc-catalog-config",
            ));
        }

        let shared_config = loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(config.s3_force_path_style);

        if let Some(endpoint) = &config.s3_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
        })
    }

    /// Issue a pre-signed PUT URL. No `Content-Length` is bound server-side — the
    /// browser supplies it — binding it would cause a signature mismatch (spec §4.2
    /// step 3).
    pub async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Other(e.into()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::Other(e.into()))?;

        Ok(presigned.uri().to_string())
    }

    pub async fn head(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Other(e.into())
                }
            })?;

        Ok(ObjectMetadata {
            content_length: output.content_length().unwrap_or_default(),
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Streams the object body; the caller is responsible for propagating cancellation
    /// to this stream (spec §5 cancellation rules exempt model streaming from the 30s
    /// request timeout but require cancellation still reach the storage GET).
    pub async fn get_stream(
        &self,
        key: &str,
    ) -> Result<(ObjectMetadata, BoxStream<'static, Result<Bytes, StorageError>>), StorageError>
    {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Other(e.into())
                }
            })?;

        let content_length = output.content_length().unwrap_or_default();
        let stream = futures::TryStreamExt::map_err(output.body, |e| StorageError::Other(e.into()));

        Ok((ObjectMetadata { content_length }, futures::StreamExt::boxed(stream)))
    }

    /// Best-effort delete: callers in the replacement-sweep path log and continue on
    /// failure rather than aborting (spec §4.2 effect 1, §7).
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.into()))?;
        Ok(())
    }
}
