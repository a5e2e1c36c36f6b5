use crate::{
    aws::load_sdk_config,
    config::Config,
    detection::{DetectionError, RekognitionDetector},
    image_utils::{AnnotationStyle, ImageUtilsError},
    pipeline::Pipeline,
    retry::RetryPolicy,
    storage::{S3ObjectStore, StorageError},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unable to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Image(#[from] ImageUtilsError),
}

pub async fn start_app(config: Config) -> Result<(), AppError> {
    // The font is embedded; load it before spending any network calls.
    let style = AnnotationStyle::new(&config.annotation)?;

    let sdk_config = load_sdk_config(&config.aws).await;
    let detector = RekognitionDetector::new(&sdk_config, &config.aws);
    let store = S3ObjectStore::new(&sdk_config, &config.aws);

    let pipeline = Pipeline::new(detector, store, style, RetryPolicy::from(&config.retry));
    let drawn = pipeline.run(&config.detection, &config.output.path).await?;

    tracing::info!(
        "Annotated s3://{}/{} with {} boxes",
        config.detection.bucket,
        config.detection.key,
        drawn
    );
    Ok(())
}
