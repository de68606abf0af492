use std::fmt::{self, Display, Formatter};

use ndarray::{Array2, Array3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An (height, width, channels) image. Pixel values are whatever the
/// preprocessing step produced; freshly loaded images are 0-255.
pub type ImageTensor = Array3<f32>;

/// One flattened feature vector per row.
pub type FeatureMatrix = Array2<f32>;

/// Maps a detector class id to the glyph it stands for.
pub type LabelTable = FxHashMap<usize, Label>;

/// The resolution images were preprocessed to before extraction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl InputShape {
    pub fn new(height: u32, width: u32, channels: u32) -> Self {
        InputShape { height, width, channels }
    }

    pub fn to_array(self) -> [u32; 3] {
        [self.height, self.width, self.channels]
    }
}

impl TryFrom<&[u32]> for InputShape {
    type Error = Error;

    fn try_from(values: &[u32]) -> Result<Self> {
        match values {
            [height, width, channels] => Ok(InputShape::new(*height, *width, *channels)),
            _ => Err(Error::Configuration(format!(
                "Input shape must have exactly 3 values, got {}",
                values.len()
            ))),
        }
    }
}

/// Identifies the brand (or class) a feature row was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrandId {
    Name(String),
    Index(i64),
}

impl Display for BrandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BrandId::Name(name) => write!(f, "{}", name),
            BrandId::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for BrandId {
    fn from(name: &str) -> Self {
        BrandId::Name(name.to_string())
    }
}

impl From<String> for BrandId {
    fn from(name: String) -> Self {
        BrandId::Name(name)
    }
}

impl From<i64> for BrandId {
    fn from(index: i64) -> Self {
        BrandId::Index(index)
    }
}

/// A feature matrix with one brand id per row and the input shape it was
/// computed at. This is the unit the feature cache reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStore {
    pub features: FeatureMatrix,
    pub brand_map: Vec<BrandId>,
    pub input_shape: InputShape,
}

impl FeatureStore {
    pub fn new(features: FeatureMatrix, brand_map: Vec<BrandId>, input_shape: InputShape) -> Result<Self> {
        if features.nrows() != brand_map.len() {
            return Err(Error::Configuration(format!(
                "Brand map has {} entries but there are {} feature rows",
                brand_map.len(),
                features.nrows()
            )));
        }
        Ok(FeatureStore { features, brand_map, input_shape })
    }

    pub fn len(&self) -> usize {
        self.brand_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brand_map.is_empty()
    }

    /// Dimensionality of each feature vector.
    pub fn feature_length(&self) -> usize {
        self.features.ncols()
    }
}

/// A detector box in pixel coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl BoundingBox {
    /// Builds a box, rejecting boxes that do not have positive width and height.
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, class_id: usize, confidence: f32) -> Result<Self> {
        let bounding_box = BoundingBox { xmin, ymin, xmax, ymax, class_id, confidence };
        if !bounding_box.is_well_formed() {
            return Err(Error::MalformedBox { xmin, ymin, xmax, ymax });
        }
        Ok(bounding_box)
    }

    pub fn is_well_formed(&self) -> bool {
        self.xmin < self.xmax && self.ymin < self.ymax
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

/// The glyph a class id decodes to, and the group of boxes it may share a word with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub character: char,
    pub word_group: String,
}

impl Label {
    pub fn new(character: char, word_group: impl Into<String>) -> Self {
        Label { character, word_group: word_group.into() }
    }
}

/// Detector output for one image, alongside the unaltered image.
#[derive(Debug, Clone)]
pub struct Detection {
    pub boxes: Vec<BoundingBox>,
    pub image: ImageTensor,
}

#[cfg(test)]
mod tests
{
    use ndarray::Array2;

    use super::*;

    #[test]
    fn test_bounding_box_rejects_inverted_coordinates()
    {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0, 1, 0.9).is_ok());
        assert!(matches!(
            BoundingBox::new(10.0, 0.0, 10.0, 5.0, 1, 0.9),
            Err(Error::MalformedBox { .. })
        ));
        assert!(BoundingBox::new(0.0, 8.0, 4.0, 2.0, 1, 0.9).is_err());
    }

    #[test]
    fn test_input_shape_from_slice()
    {
        let shape = InputShape::try_from(&[224u32, 224, 3][..]).unwrap();
        assert_eq!(shape, InputShape::new(224, 224, 3));
        assert!(InputShape::try_from(&[224u32, 224][..]).is_err());
    }

    #[test]
    fn test_feature_store_requires_one_brand_per_row()
    {
        let features = Array2::<f32>::zeros((3, 4));
        let brands: Vec<BrandId> = vec!["a".into(), "b".into()];
        assert!(FeatureStore::new(features, brands, InputShape::new(64, 64, 3)).is_err());
    }
}
