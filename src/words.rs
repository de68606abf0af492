use std::path::Path;

use log::warn;

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Label, LabelTable};

// The band tolerance is the image height divided by this.
const BAND_TOLERANCE_DIVISOR: f32 = 10.0;

struct Glyph<'a> {
    center_x: f32,
    center_y: f32,
    label: &'a Label,
}

/// Groups detected glyphs into words with a single greedy left-to-right pass.
///
/// Glyphs are ordered by center x. The leftmost unclaimed glyph seeds a word
/// and claims every later unclaimed glyph in the same word group whose center
/// y passes the band test; claimed glyphs are appended in scan order. This
/// repeats until every glyph is claimed, so words come out in seed order.
///
/// Two quirks are kept on purpose and may be revisited:
/// - The "center" of a box is half its width and half its height, not its
///   midpoint, so position in the image does not enter the comparison.
/// - The band test joins its lower and upper bound with `||`, which accepts
///   any finite center. In practice only the word group separates words.
///
/// Malformed boxes are skipped with a warning. A class id that is not in
/// `labels` is an error. Glyphs with equal center x keep their input order.
pub fn cluster_words(image_height: u32, boxes: &[BoundingBox], labels: &LabelTable) -> Result<Vec<String>> {
    if image_height == 0 {
        return Err(Error::Configuration("Image height must be positive".to_string()));
    }
    let tolerance = image_height as f32 / BAND_TOLERANCE_DIVISOR;

    let mut glyphs = Vec::with_capacity(boxes.len());
    for bounding_box in boxes {
        if !bounding_box.is_well_formed() {
            warn!("Skipping malformed bounding box {:?}", bounding_box);
            continue;
        }
        let label = labels
            .get(&bounding_box.class_id)
            .ok_or(Error::UnknownClass(bounding_box.class_id))?;
        glyphs.push(Glyph {
            center_x: bounding_box.width() / 2.0,
            center_y: bounding_box.height() / 2.0,
            label,
        });
    }

    // Stable, so ties keep their input order.
    glyphs.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));

    let mut claimed = vec![false; glyphs.len()];
    let mut words = Vec::new();
    for seed_index in 0..glyphs.len() {
        if claimed[seed_index] {
            continue;
        }
        claimed[seed_index] = true;
        let seed = &glyphs[seed_index];

        let mut word = String::new();
        word.push(seed.label.character);
        for candidate_index in seed_index + 1..glyphs.len() {
            if claimed[candidate_index] {
                continue;
            }
            let candidate = &glyphs[candidate_index];
            if candidate.label.word_group == seed.label.word_group
                && within_band(candidate.center_y, seed.center_y, tolerance)
            {
                word.push(candidate.label.character);
                claimed[candidate_index] = true;
            }
        }
        words.push(word);
    }

    Ok(words)
}

fn within_band(center_y: f32, seed_y: f32, tolerance: f32) -> bool {
    // Disjunction, not conjunction: see cluster_words.
    center_y >= seed_y - tolerance || center_y <= seed_y + tolerance
}

/// Reads the pixel height from the image header and clusters `boxes` into words.
pub fn recognize_strings(image_path: &Path, boxes: &[BoundingBox], labels: &LabelTable) -> Result<Vec<String>> {
    let size = imagesize::size(image_path).map_err(|e| Error::ImageOpen {
        path: image_path.to_path_buf(),
        source: image::ImageError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
    })?;
    cluster_words(size.height as u32, boxes, labels)
}
