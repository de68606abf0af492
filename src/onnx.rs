use std::path::Path;

use ndarray::{Array4, ArrayD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use crate::config::ExtractorModel;
use crate::features::FeatureExtractor;
use crate::models::InputShape;

const INTRA_THREADS: usize = 4;

/// Layout of the image input the ONNX graph was exported with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputLayout
{
    /// (batch, height, width, channels), as exported from Keras.
    ChannelsLast,
    /// (batch, channels, height, width), as exported from PyTorch.
    ChannelsFirst,
}

/// A headless backbone (InceptionV3 or VGG16 without its classifier) running
/// on ONNX Runtime.
///
/// Loading a session takes a while, so build one `OnnxExtractor` up front and
/// hand it to every `FeatureExtractionPipeline` that needs it.
pub struct OnnxExtractor
{
    session: Session,
    layout: InputLayout,
    model: ExtractorModel,
    input_shape: InputShape,
}

impl OnnxExtractor
{
    pub fn new(model_path: &Path, model: ExtractorModel, flavor: u8, layout: InputLayout) -> anyhow::Result<Self>
    {
        let input_shape = model.input_shape(flavor)?;

        let now = std::time::Instant::now();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?
            .commit_from_file(model_path)?;
        log::info!("Loaded {:?} feature extractor from {:?} in {:?}", model, model_path, now.elapsed());

        Ok(OnnxExtractor { session, layout, model, input_shape })
    }

    pub fn model(&self) -> ExtractorModel
    {
        self.model
    }

    /// The resolution images must be resized to before extraction.
    pub fn input_shape(&self) -> InputShape
    {
        self.input_shape
    }
}

impl FeatureExtractor for OnnxExtractor
{
    fn extract(&mut self, batch: Array4<f32>) -> anyhow::Result<ArrayD<f32>>
    {
        let input = match self.layout {
            InputLayout::ChannelsLast => batch.as_standard_layout().into_owned(),
            InputLayout::ChannelsFirst => batch.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned(),
        };

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(&input)?])?;

        // The first output holds the activations; its leading axis is the batch.
        let output = outputs[0].try_extract_array::<f32>()?;
        Ok(output.to_owned())
    }
}
