/// Location of the source image in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub bucket: String,
    pub key: String,
}

impl ImageRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Box coordinates as ratios of the image dimensions (0.0 - 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Scales the box by the dimensions of the decoded image, never by any
    /// size reported alongside the detection.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> PixelRect {
        let image_width = image_width as f32;
        let image_height = image_height as f32;
        PixelRect {
            x: self.left * image_width,
            y: self.top * image_height,
            width: self.width * image_width,
            height: self.height * image_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
    /// `None` for image-level labels that carry no geometry.
    pub bounding_box: Option<BoundingBox>,
}
