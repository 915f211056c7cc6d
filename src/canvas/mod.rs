mod offsets;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage, imageops};
use std::path::Path;
use tracing::{debug, error, info};

use crate::error::AssemblyError;

pub use offsets::{OffsetEntry, OffsetTable, SourceLocation};
pub(crate) use offsets::validate_tiling;

pub const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasOptions {
    /// Downscale every source by the same factor when the widest exceeds this.
    pub max_width: Option<u32>,
    /// Padding color for sources narrower than the canvas.
    pub background: [u8; 3],
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            max_width: None,
            background: DEFAULT_BACKGROUND,
        }
    }
}

/// The tall image built from a chapter's sources, plus the table mapping its
/// rows back to them.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbImage,
    offsets: OffsetTable,
}

impl Canvas {
    pub fn from_parts(image: RgbImage, offsets: OffsetTable) -> Result<Self, AssemblyError> {
        if offsets.height() != image.height() {
            return Err(AssemblyError::offsets(format!(
                "offset table covers {} rows but the image has {}",
                offsets.height(),
                image.height()
            )));
        }
        offsets.validate()?;
        Ok(Self { image, offsets })
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_parts(self) -> (RgbImage, OffsetTable) {
        (self.image, self.offsets)
    }
}

/// Stacks `sources` top to bottom in the given order.
pub fn build_canvas(sources: &[RgbImage], options: &CanvasOptions) -> Result<Canvas, AssemblyError> {
    if sources.is_empty() {
        return Err(AssemblyError::EmptyInput);
    }
    for (index, source) in sources.iter().enumerate() {
        if source.width() == 0 || source.height() == 0 {
            return Err(AssemblyError::EmptySource {
                index,
                width: source.width(),
                height: source.height(),
            });
        }
    }

    let widest = sources.iter().map(|img| img.width()).max().unwrap_or(0);
    let scale = width_scale(widest, options.max_width);
    if scale < 1.0 {
        info!(
            "canvas: downscaling {} sources by {:.4} (widest {}px, max {}px)",
            sources.len(),
            scale,
            widest,
            options.max_width.unwrap_or(widest)
        );
    }

    let scaled: Vec<std::borrow::Cow<'_, RgbImage>> = sources
        .iter()
        .map(|img| {
            if scale < 1.0 {
                let w = scaled_dim(img.width(), scale);
                let h = scaled_dim(img.height(), scale);
                std::borrow::Cow::Owned(imageops::resize(
                    img,
                    w,
                    h,
                    imageops::FilterType::Lanczos3,
                ))
            } else {
                std::borrow::Cow::Borrowed(img)
            }
        })
        .collect();

    let placed: Vec<&RgbImage> = scaled.iter().map(|img| img.as_ref()).collect();
    let (image, entries) = stack_vertically(&placed, options.background);
    let height = image.height();
    let entries = entries
        .into_iter()
        .map(|entry| OffsetEntry { scale, ..entry })
        .collect();
    let offsets = OffsetTable::new(entries, height)?;
    info!(
        "canvas: stitched {} sources into {}x{}",
        sources.len(),
        image.width(),
        height
    );
    Canvas::from_parts(image, offsets)
}

/// Center-aligns `images` on a canvas as wide as the widest one.
pub(crate) fn stack_vertically(images: &[&RgbImage], background: [u8; 3]) -> (RgbImage, Vec<OffsetEntry>) {
    let width = images.iter().map(|img| img.width()).max().unwrap_or(0);
    let height: u32 = images.iter().map(|img| img.height()).sum();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb(background));
    let mut entries = Vec::with_capacity(images.len());
    let mut cursor = 0u32;
    for (source_id, img) in images.iter().enumerate() {
        let x_offset = (width - img.width()) / 2;
        imageops::replace(&mut canvas, *img, i64::from(x_offset), i64::from(cursor));
        debug!(
            "canvas: source {} at rows {}..{} (x offset {})",
            source_id,
            cursor,
            cursor + img.height(),
            x_offset
        );
        entries.push(OffsetEntry {
            source_id,
            canvas_y_start: cursor,
            canvas_y_end: cursor + img.height(),
            x_offset,
            scale: 1.0,
            width: img.width(),
        });
        cursor += img.height();
    }
    (canvas, entries)
}

fn width_scale(widest: u32, max_width: Option<u32>) -> f32 {
    match max_width {
        Some(max) if max > 0 && widest > max => max as f32 / widest as f32,
        _ => 1.0,
    }
}

fn scaled_dim(value: u32, scale: f32) -> u32 {
    ((value as f32 * scale).round() as u32).max(1)
}

/// Decodes the files in order. Files that fail to decode are logged and
/// skipped; at least one must load.
pub fn load_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RgbImage>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        match image::open(path) {
            Ok(img) => images.push(img.to_rgb8()),
            Err(err) => error!("failed to load source {}: {}", path.display(), err),
        }
    }
    if images.is_empty() {
        return Err(AssemblyError::EmptyInput).with_context(|| {
            format!("none of the {} source images could be decoded", paths.len())
        });
    }
    Ok(images)
}
