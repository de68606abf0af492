use std::path::Path;

use image::DynamicImage;
use log::warn;

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Detection};
use crate::preprocessing;

/// An opaque object detector. Any `FnMut(&DynamicImage) -> anyhow::Result<Vec<BoundingBox>>`
/// closure is a detector.
pub trait Detector {
    fn detect(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>>;
}

impl<F> Detector for F
where
    F: FnMut(&DynamicImage) -> anyhow::Result<Vec<BoundingBox>>,
{
    fn detect(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<BoundingBox>> {
        self(image)
    }
}

/// Runs `detector` on the image at `path`.
///
/// Returns `Ok(None)` if the image cannot be opened, so callers can skip it.
/// Detector failures are returned as errors.
pub fn detect_object<D: Detector + ?Sized>(detector: &mut D, path: &Path) -> Result<Option<Detection>> {
    let image = match preprocessing::open_image(path) {
        Ok(image) => DynamicImage::ImageRgb8(image.to_rgb8()),
        Err(e) => {
            warn!("Skipping detection: {}", e);
            return Ok(None);
        }
    };

    let boxes = detector.detect(&image).map_err(Error::ExtractorInvocation)?;
    Ok(Some(Detection {
        boxes,
        image: preprocessing::image_to_tensor(&image),
    }))
}
