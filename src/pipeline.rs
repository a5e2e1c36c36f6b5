use crate::{
    app::AppError,
    config::DetectionConfig,
    detection::LabelDetector,
    image_utils::{AnnotatedImage, AnnotationStyle},
    label::ImageRef,
    retry::{with_retry, RetryPolicy},
    storage::ObjectStore,
};
use std::path::Path;

pub struct Pipeline<D: LabelDetector, S: ObjectStore> {
    detector: D,
    store: S,
    style: AnnotationStyle,
    retry_policy: RetryPolicy,
}

impl<D: LabelDetector, S: ObjectStore> Pipeline<D, S> {
    pub fn new(detector: D, store: S, style: AnnotationStyle, retry_policy: RetryPolicy) -> Self {
        Self {
            detector,
            store,
            style,
            retry_policy,
        }
    }

    /// Detects, downloads, annotates and saves one image. Returns the number
    /// of boxes drawn. Nothing is written unless every stage succeeds.
    pub async fn run(&self, request: &DetectionConfig, output: &Path) -> Result<usize, AppError> {
        let image_ref = ImageRef::new(&request.bucket, &request.key);

        let detector = &self.detector;
        let target = &image_ref;
        let labels = with_retry(&self.retry_policy, "DetectCustomLabels", move || {
            detector.detect(target, &request.model_arn, request.min_confidence)
        })
        .await?;

        tracing::info!("Detected {} labels", labels.len());
        for label in &labels {
            tracing::info!("{}: {}", label.name, label.confidence);
        }

        let store = &self.store;
        let bytes = with_retry(&self.retry_policy, "GetObject", move || store.fetch(target)).await?;

        let mut image = AnnotatedImage::from_bytes(&bytes)?;
        tracing::debug!("Decoded {}x{} image", image.width(), image.height());

        let drawn = image.annotate(&labels, &self.style);
        image.save_png(output)?;

        Ok(drawn.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnotationConfig;
    use crate::detection::DetectionError;
    use crate::label::{BoundingBox, DetectedLabel};
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use image::{ImageBuffer, ImageFormat, Rgb, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockDetector {
        labels: Vec<DetectedLabel>,
        transient_failures: AtomicU32,
        calls: Mutex<Vec<(ImageRef, String, f32)>>,
    }

    impl MockDetector {
        fn new(labels: Vec<DetectedLabel>) -> Self {
            Self {
                labels,
                transient_failures: AtomicU32::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LabelDetector for MockDetector {
        async fn detect(
            &self,
            image: &ImageRef,
            model_arn: &str,
            min_confidence: f32,
        ) -> Result<Vec<DetectedLabel>, DetectionError> {
            self.calls
                .lock()
                .unwrap()
                .push((image.clone(), model_arn.to_string(), min_confidence));
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(DetectionError::Timeout(Duration::from_secs(1)));
            }
            Ok(self.labels.clone())
        }
    }

    struct MockStore {
        object: Option<Vec<u8>>,
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn fetch(&self, image: &ImageRef) -> Result<Bytes, StorageError> {
            match &self.object {
                Some(data) => Ok(Bytes::from(data.clone())),
                None => Err(StorageError::NotFound {
                    bucket: image.bucket.clone(),
                    key: image.key.clone(),
                }),
            }
        }
    }

    fn source_png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb([0, 128, 0]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    fn request() -> DetectionConfig {
        DetectionConfig {
            bucket: "photos".to_string(),
            key: "cat.jpg".to_string(),
            model_arn: "arn:model/v1".to_string(),
            min_confidence: 70.0,
        }
    }

    fn cat() -> DetectedLabel {
        DetectedLabel {
            name: "Cat".to_string(),
            confidence: 92.5,
            bounding_box: Some(BoundingBox {
                left: 0.1,
                top: 0.2,
                width: 0.3,
                height: 0.4,
            }),
        }
    }

    fn pipeline(detector: MockDetector, store: MockStore) -> Pipeline<MockDetector, MockStore> {
        let style = AnnotationStyle::new(&AnnotationConfig::default()).unwrap();
        let retry_policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        Pipeline::new(detector, store, style, retry_policy)
    }

    #[tokio::test]
    async fn test_cat_scenario_writes_annotated_png() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let pipeline = pipeline(
            MockDetector::new(vec![cat()]),
            MockStore {
                object: Some(source_png(1000, 500)),
            },
        );

        let drawn = pipeline.run(&request(), &output).await?;

        assert_eq!(drawn, 1);
        let saved = image::open(&output)?.to_rgba8();
        assert_eq!(saved.dimensions(), (1000, 500));
        assert_eq!(*saved.get_pixel(100, 100), Rgba([255, 0, 0, 255]));
        assert_eq!(*saved.get_pixel(399, 299), Rgba([255, 0, 0, 255]));
        assert_eq!(*saved.get_pixel(250, 200), Rgba([0, 128, 0, 255]));

        let calls = pipeline.detector.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(
                ImageRef::new("photos", "cat.jpg"),
                "arn:model/v1".to_string(),
                70.0
            )]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_no_labels_output_matches_source() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let source = source_png(64, 32);
        let pipeline = pipeline(
            MockDetector::new(vec![]),
            MockStore {
                object: Some(source.clone()),
            },
        );

        let drawn = pipeline.run(&request(), &output).await?;

        assert_eq!(drawn, 0);
        let expected = image::load_from_memory(&source)?.to_rgba8();
        let saved = image::open(&output)?.to_rgba8();
        assert_eq!(saved, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_min_confidence_passed_through_unfiltered() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let low = DetectedLabel {
            confidence: 12.0,
            ..cat()
        };
        let pipeline = pipeline(
            MockDetector::new(vec![low]),
            MockStore {
                object: Some(source_png(100, 100)),
            },
        );
        let request = DetectionConfig {
            min_confidence: 88.25,
            ..request()
        };

        let drawn = pipeline.run(&request, &output).await?;

        // The service owns the floor; whatever it returns is drawn.
        assert_eq!(drawn, 1);
        let calls = pipeline.detector.calls.lock().unwrap();
        assert_eq!(calls[0].2, 88.25);
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_existing_output() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        std::fs::write(&output, b"previous run")?;
        let pipeline = pipeline(MockDetector::new(vec![cat()]), MockStore { object: None });

        let result = pipeline.run(&request(), &output).await;

        assert!(matches!(
            result,
            Err(AppError::Storage(StorageError::NotFound { .. }))
        ));
        assert_eq!(std::fs::read(&output)?, b"previous run");
        Ok(())
    }

    #[tokio::test]
    async fn test_decode_failure_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let pipeline = pipeline(
            MockDetector::new(vec![cat()]),
            MockStore {
                object: Some(b"GIF? no".to_vec()),
            },
        );

        let result = pipeline.run(&request(), &output).await;

        assert!(matches!(result, Err(AppError::Image(_))));
        assert!(!output.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_detection_failure_is_retried() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let detector = MockDetector::new(vec![cat()]);
        detector.transient_failures.store(2, Ordering::SeqCst);
        let pipeline = pipeline(
            detector,
            MockStore {
                object: Some(source_png(50, 50)),
            },
        );

        let drawn = pipeline.run(&request(), &output).await?;

        assert_eq!(drawn, 1);
        assert_eq!(pipeline.detector.calls.lock().unwrap().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_detection_gives_up_after_retries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("output.png");
        let detector = MockDetector::new(vec![cat()]);
        detector.transient_failures.store(10, Ordering::SeqCst);
        let pipeline = pipeline(
            detector,
            MockStore {
                object: Some(source_png(50, 50)),
            },
        );

        let result = pipeline.run(&request(), &output).await;

        assert!(matches!(result, Err(AppError::Detection(_))));
        assert!(!output.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_identical_runs_produce_identical_files() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first.png");
        let second = dir.path().join("second.png");
        let pipeline = pipeline(
            MockDetector::new(vec![cat()]),
            MockStore {
                object: Some(source_png(300, 200)),
            },
        );

        pipeline.run(&request(), &first).await?;
        pipeline.run(&request(), &second).await?;

        assert_eq!(std::fs::read(&first)?, std::fs::read(&second)?);
        Ok(())
    }
}
