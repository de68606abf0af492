use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ImageTensor, InputShape};
use crate::preprocessing;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// The backbone a feature extractor was exported from.
///
/// `flavor` picks a variant of the backbone. For InceptionV3 flavor 0 is the
/// full network at 299x299 and flavors 1-4 are truncated variants at 200x200.
/// For VGG16 flavors 0, 1 and 2 select 224, 128 and 64 pixel inputs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractorModel {
    InceptionV3,
    Vgg16,
}

impl ExtractorModel {
    pub fn input_shape(&self, flavor: u8) -> Result<InputShape> {
        match (self, flavor) {
            (ExtractorModel::InceptionV3, 0) => Ok(InputShape::new(299, 299, 3)),
            (ExtractorModel::InceptionV3, 1..=4) => Ok(InputShape::new(200, 200, 3)),
            (ExtractorModel::Vgg16, 0) => Ok(InputShape::new(224, 224, 3)),
            (ExtractorModel::Vgg16, 1) => Ok(InputShape::new(128, 128, 3)),
            (ExtractorModel::Vgg16, 2) => Ok(InputShape::new(64, 64, 3)),
            _ => Err(Error::Configuration(format!("{:?} has no flavor {}", self, flavor))),
        }
    }

    pub fn preprocess(&self) -> fn(&ImageTensor) -> ImageTensor {
        match self {
            ExtractorModel::InceptionV3 => preprocessing::inception_preprocess,
            ExtractorModel::Vgg16 => preprocessing::vgg16_preprocess,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub model: ExtractorModel,
    pub flavor: u8,
    pub batch_size: usize,
    pub cache_path: PathBuf,
    pub image_extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            model: ExtractorModel::InceptionV3,
            flavor: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_path: PathBuf::from("features.bin"),
            image_extensions: ["jpg", "jpeg", "png", "mp4"].iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("Batch size must be positive".to_string()));
        }
        if self.image_extensions.is_empty() {
            return Err(Error::Configuration("At least one image extension is required".to_string()));
        }
        self.model.input_shape(self.flavor)?;
        Ok(())
    }

    pub fn input_shape(&self) -> Result<InputShape> {
        self.model.input_shape(self.flavor)
    }
}
