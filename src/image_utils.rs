use crate::config::AnnotationConfig;
use crate::label::{DetectedLabel, PixelRect};
use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont};
use image::{ImageFormat, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::io::{Cursor, Write};
use std::path::Path;
use thiserror::Error;

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum ImageUtilsError {
    #[error("Can't decode image: {0}")]
    DecodeFailed(#[source] image::ImageError),
    #[error("Unable to load font: {0}")]
    FontLoadFailed(#[from] InvalidFont),
    #[error("Error encoding image: {0}")]
    EncodeFailed(#[source] image::ImageError),
    #[error("Error saving image to {path}: {source}")]
    SaveFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct AnnotationStyle {
    font: FontRef<'static>,
    scale: PxScale,
    color: Rgba<u8>,
    stroke_width: u32,
}

impl AnnotationStyle {
    pub fn new(config: &AnnotationConfig) -> Result<Self, ImageUtilsError> {
        Self::with_font_data(EMBEDDED_FONT, config)
    }

    fn with_font_data(
        font_data: &'static [u8],
        config: &AnnotationConfig,
    ) -> Result<Self, ImageUtilsError> {
        let font = FontRef::try_from_slice(font_data)?;
        let scale = em_scale(&font, config.font_scale);
        let [red, green, blue] = config.color;
        Ok(Self {
            font,
            scale,
            color: Rgba([red, green, blue, 255]),
            stroke_width: config.stroke_width,
        })
    }
}

/// `font_scale` is the em size in pixels (a point size at 72 DPI), whereas
/// `PxScale` measures ascent to descent.
fn em_scale(font: &FontRef<'_>, em_px: f32) -> PxScale {
    match font.units_per_em() {
        Some(units_per_em) => PxScale::from(em_px * font.height_unscaled() / units_per_em),
        None => PxScale::from(em_px),
    }
}

pub struct AnnotatedImage {
    pub buffer: RgbaImage,
}

impl AnnotatedImage {
    /// Decodes JPEG, PNG or any other enabled format, sniffed from content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageUtilsError> {
        let image = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageUtilsError::DecodeFailed(image::ImageError::IoError(e)))?
            .decode()
            .map_err(ImageUtilsError::DecodeFailed)?;
        Ok(Self {
            buffer: image.to_rgba8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Draws each label's box and name in the given order and returns the
    /// pixel rectangles that were drawn. Labels without geometry are skipped.
    pub fn annotate(
        &mut self,
        labels: &[DetectedLabel],
        style: &AnnotationStyle,
    ) -> Vec<PixelRect> {
        let (width, height) = (self.width(), self.height());
        let mut drawn = Vec::with_capacity(labels.len());

        for (i, label) in labels.iter().enumerate() {
            let Some(bbox) = label.bounding_box else {
                tracing::warn!("Label #{} ({}) has no bounding box, skipping", i, label.name);
                continue;
            };
            let rect = bbox.to_pixels(width, height);

            tracing::debug!(
                "Detected label #{}: {} at left={:.1} top={:.1} width={:.1} height={:.1}",
                i,
                label.name,
                rect.x,
                rect.y,
                rect.width,
                rect.height
            );

            self.stroke_rect(&rect, style);
            self.draw_label(&label.name, &rect, style);
            drawn.push(rect);
        }

        drawn
    }

    /// Strokes the outline centered on the rectangle's edges. Lines outside
    /// the canvas are clipped by imageproc.
    fn stroke_rect(&mut self, rect: &PixelRect, style: &AnnotationStyle) {
        let x = rect.x.round() as i32;
        let y = rect.y.round() as i32;
        let w = rect.width.round() as i32;
        let h = rect.height.round() as i32;
        let half = style.stroke_width as i32 / 2;

        for inset in -half..(style.stroke_width as i32 - half) {
            let inset_w = w - 2 * inset;
            let inset_h = h - 2 * inset;
            if inset_w <= 0 || inset_h <= 0 {
                continue;
            }
            let outline = Rect::at(x + inset, y + inset).of_size(inset_w as u32, inset_h as u32);
            draw_hollow_rect_mut(&mut self.buffer, outline, style.color);
        }
    }

    /// Puts the text baseline on the box's top-left corner.
    fn draw_label(&mut self, text: &str, rect: &PixelRect, style: &AnnotationStyle) {
        if text.is_empty() {
            return;
        }
        let ascent = style.font.as_scaled(style.scale).ascent();
        let x = rect.x.round() as i32;
        let y = (rect.y - ascent).round() as i32;
        draw_text_mut(
            &mut self.buffer,
            style.color,
            x,
            y,
            style.scale,
            &style.font,
            text,
        );
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ImageUtilsError> {
        let mut buf = Cursor::new(Vec::new());
        self.buffer
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(ImageUtilsError::EncodeFailed)?;
        Ok(buf.into_inner())
    }

    /// Writes the PNG next to `path` and renames it into place, so a failure
    /// never leaves a partial file or clobbers an existing one.
    pub fn save_png(&self, path: &Path) -> Result<(), ImageUtilsError> {
        let png = self.to_png()?;
        let save_err = |source: std::io::Error| ImageUtilsError::SaveFailed {
            path: path.display().to_string(),
            source,
        };

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".custom_labels")
            .suffix(".png")
            .tempfile_in(directory)
            .map_err(save_err)?;
        staged.write_all(&png).map_err(save_err)?;
        staged.as_file().sync_all().map_err(save_err)?;
        staged.persist(path).map_err(|e| save_err(e.error))?;

        tracing::info!("Saved annotated image to {}", path.display());
        Ok(())
    }
}
