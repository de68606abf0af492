pub mod batching;
pub mod cache;
pub mod config;
pub mod detection;
pub mod error;
pub mod export;
pub mod features;
pub mod files;
pub mod models;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocessing;
pub mod similarity;
pub mod words;

pub use batching::BatchGenerator;
pub use cache::{load_features, save_features};
pub use config::{ExtractorModel, PipelineConfig};
pub use detection::{detect_object, Detector};
pub use error::{Error, Result};
pub use features::{features_from_images, FeatureExtractionPipeline, FeatureExtractor};
pub use models::{BoundingBox, BrandId, Detection, FeatureMatrix, FeatureStore, ImageTensor, InputShape, Label, LabelTable};
pub use words::{cluster_words, recognize_strings};
