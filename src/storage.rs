use crate::aws::is_retryable_response;
use crate::config::AwsConfig;
use crate::label::ImageRef;
use crate::retry::Transient;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::get_object::GetObjectError,
    Client,
};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unable to retrieve image: s3://{bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },
    #[error("Unable to retrieve image: {message}")]
    RequestFailed { message: String, transient: bool },
    #[error("Unable to read image body: {0}")]
    BodyFailed(String),
    #[error("Unable to retrieve image: no response after {0:?}")]
    Timeout(Duration),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => false,
            StorageError::RequestFailed { transient, .. } => *transient,
            StorageError::BodyFailed(_) | StorageError::Timeout(_) => true,
        }
    }
}

fn classify_get_object_error(
    image: &ImageRef,
    err: SdkError<GetObjectError, HttpResponse>,
) -> StorageError {
    if err
        .as_service_error()
        .is_some_and(|service_err| service_err.is_no_such_key())
    {
        return StorageError::NotFound {
            bucket: image.bucket.clone(),
            key: image.key.clone(),
        };
    }

    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => {
            is_retryable_response(context.err().code(), context.raw().status().as_u16())
        }
        _ => false,
    };
    StorageError::RequestFailed {
        message: DisplayErrorContext(&err).to_string(),
        transient,
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, image: &ImageRef) -> Result<Bytes, StorageError>;
}

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
    request_timeout: Duration,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig, aws_config: &AwsConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        // Emulators behind a custom endpoint rarely support virtual-hosted buckets.
        if aws_config.endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            request_timeout: aws_config.get_timeout(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn fetch(&self, image: &ImageRef) -> Result<Bytes, StorageError> {
        let download = async {
            let response = self
                .client
                .get_object()
                .bucket(&image.bucket)
                .key(&image.key)
                .send()
                .await
                .map_err(|e| classify_get_object_error(image, e))?;

            let body = response
                .body
                .collect()
                .await
                .map_err(|e| StorageError::BodyFailed(e.to_string()))?;

            Ok::<_, StorageError>(body.into_bytes())
        };

        let bytes = timeout(self.request_timeout, download)
            .await
            .map_err(|_| StorageError::Timeout(self.request_timeout))??;

        tracing::debug!("Fetched {} bytes", bytes.len());
        Ok(bytes)
    }
}
