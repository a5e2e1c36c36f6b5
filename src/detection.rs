use crate::aws::is_retryable_response;
use crate::config::AwsConfig;
use crate::label::{BoundingBox, DetectedLabel, ImageRef};
use crate::retry::Transient;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::detect_custom_labels::DetectCustomLabelsError,
    types::{CustomLabel, Image, S3Object},
    Client,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Unable to detect custom labels: {message}")]
    RequestFailed { message: String, transient: bool },
    #[error("Unable to detect custom labels: no response after {0:?}")]
    Timeout(Duration),
}

impl Transient for DetectionError {
    fn is_transient(&self) -> bool {
        match self {
            DetectionError::RequestFailed { transient, .. } => *transient,
            DetectionError::Timeout(_) => true,
        }
    }
}

impl From<SdkError<DetectCustomLabelsError, HttpResponse>> for DetectionError {
    fn from(err: SdkError<DetectCustomLabelsError, HttpResponse>) -> Self {
        let transient = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                true
            }
            SdkError::ServiceError(context) => {
                let service_err = context.err();
                service_err.is_throttling_exception()
                    || service_err.is_internal_server_error()
                    || service_err.is_provisioned_throughput_exceeded_exception()
                    || is_retryable_response(service_err.code(), context.raw().status().as_u16())
            }
            _ => false,
        };
        DetectionError::RequestFailed {
            message: DisplayErrorContext(&err).to_string(),
            transient,
        }
    }
}

#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Returns labels in the order the service produced them. The confidence
    /// floor is enforced by the service, not filtered here.
    async fn detect(
        &self,
        image: &ImageRef,
        model_arn: &str,
        min_confidence: f32,
    ) -> Result<Vec<DetectedLabel>, DetectionError>;
}

#[derive(Clone, Debug)]
pub struct RekognitionDetector {
    client: Client,
    request_timeout: Duration,
}

impl RekognitionDetector {
    pub fn new(sdk_config: &SdkConfig, aws_config: &AwsConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            request_timeout: aws_config.get_timeout(),
        }
    }
}

#[async_trait]
impl LabelDetector for RekognitionDetector {
    #[instrument(skip(self))]
    async fn detect(
        &self,
        image: &ImageRef,
        model_arn: &str,
        min_confidence: f32,
    ) -> Result<Vec<DetectedLabel>, DetectionError> {
        let s3_object = S3Object::builder()
            .bucket(&image.bucket)
            .name(&image.key)
            .build();

        let request = self
            .client
            .detect_custom_labels()
            .image(Image::builder().s3_object(s3_object).build())
            .project_version_arn(model_arn)
            .min_confidence(min_confidence)
            .send();

        let response = timeout(self.request_timeout, request)
            .await
            .map_err(|_| DetectionError::Timeout(self.request_timeout))??;

        Ok(response.custom_labels().iter().map(to_detected_label).collect())
    }
}

fn to_detected_label(label: &CustomLabel) -> DetectedLabel {
    let bounding_box = label
        .geometry()
        .and_then(|geometry| geometry.bounding_box())
        .map(|bbox| BoundingBox {
            left: bbox.left().unwrap_or_default(),
            top: bbox.top().unwrap_or_default(),
            width: bbox.width().unwrap_or_default(),
            height: bbox.height().unwrap_or_default(),
        });

    DetectedLabel {
        name: label.name().unwrap_or_default().to_string(),
        confidence: label.confidence().unwrap_or_default(),
        bounding_box,
    }
}
