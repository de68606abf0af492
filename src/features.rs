use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info, warn};
use ndarray::{concatenate, stack, Array4, ArrayD, Axis, Slice};

use crate::batching::BatchGenerator;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::models::{FeatureMatrix, ImageTensor, InputShape};
use crate::preprocessing;

/// An opaque model that turns a batch of images into raw activations.
///
/// The input is a (batch, height, width, channels) array. The output's first
/// axis must be the batch axis; any trailing axes are flattened into the
/// feature vector by the pipeline.
pub trait FeatureExtractor
{
    fn extract(&mut self, batch: Array4<f32>) -> anyhow::Result<ArrayD<f32>>;
}

impl<F> FeatureExtractor for F
where
    F: FnMut(Array4<f32>) -> anyhow::Result<ArrayD<f32>>,
{
    fn extract(&mut self, batch: Array4<f32>) -> anyhow::Result<ArrayD<f32>>
    {
        self(batch)
    }
}

/// Per-image preprocessing applied before batching.
pub type Preprocess = dyn Fn(&ImageTensor) -> ImageTensor;

/// Extracts one flattened feature vector per image, in input order.
///
/// Images are fed through a cyclic `BatchGenerator` for exactly
/// `ceil(N / batch_size)` steps. The last batch may wrap around to the first
/// images; those extra rows are dropped, so row `i` of the result always
/// belongs to `images[i]`. An empty input returns an empty matrix without
/// calling the extractor.
///
/// Extractor failures are returned as `Error::ExtractorInvocation` and are not retried.
pub fn features_from_images<E>(
    images: &[ImageTensor],
    extractor: &mut E,
    preprocess: Option<&Preprocess>,
    batch_size: usize,
) -> Result<FeatureMatrix>
where
    E: FeatureExtractor + ?Sized,
{
    if batch_size == 0 {
        return Err(Error::Configuration("Batch size must be positive".to_string()));
    }
    if images.is_empty() {
        return Ok(FeatureMatrix::zeros((0, 0)));
    }

    let now = Instant::now();
    let generator = BatchGenerator::with_transform(images, batch_size, |image: &ImageTensor| match preprocess {
        Some(preprocess) => preprocess(image),
        None => image.clone(),
    })?;
    let steps = generator.steps();

    let mut outputs: Vec<ArrayD<f32>> = Vec::with_capacity(steps);
    for (step, batch) in generator.take(steps).enumerate()
    {
        let views: Vec<_> = batch.iter().map(|image| image.view()).collect();
        let input = stack(Axis(0), &views)?;

        let output = extractor.extract(input).map_err(Error::ExtractorInvocation)?;
        if output.ndim() == 0 || output.len_of(Axis(0)) != batch_size {
            return Err(Error::ExtractorInvocation(anyhow::anyhow!(
                "Extractor returned shape {:?} for a batch of {} images",
                output.shape(),
                batch_size
            )));
        }

        debug!("Extracted batch {}/{} with output shape {:?}", step + 1, steps, output.shape());
        outputs.push(output);
    }

    let views: Vec<_> = outputs.iter().map(|output| output.view()).collect();
    let features = concatenate(Axis(0), &views)?;

    // The final batch may have wrapped around to the start of the input.
    let features = features.slice_axis(Axis(0), Slice::from(..images.len()));

    // Flatten every trailing axis into one feature vector per image.
    let feature_length: usize = features.shape()[1..].iter().product();
    let features: FeatureMatrix = features.to_shape((images.len(), feature_length))?.to_owned();

    info!(
        "Extracted {:?} features from {} images in {} steps in {:?}",
        features.dim(),
        images.len(),
        steps,
        now.elapsed()
    );

    Ok(features)
}

/// Runs a borrowed extractor with a fixed input shape, preprocessing and batch size.
///
/// The extractor is constructed once by the caller and may be shared across
/// many pipeline runs.
pub struct FeatureExtractionPipeline<'e, E: FeatureExtractor + ?Sized>
{
    extractor: &'e mut E,
    preprocess: Option<Box<Preprocess>>,
    input_shape: InputShape,
    batch_size: usize,
}

impl<'e, E: FeatureExtractor + ?Sized> FeatureExtractionPipeline<'e, E>
{
    pub fn new(extractor: &'e mut E, input_shape: InputShape, batch_size: usize) -> Result<Self>
    {
        if batch_size == 0 {
            return Err(Error::Configuration("Batch size must be positive".to_string()));
        }
        Ok(FeatureExtractionPipeline { extractor, preprocess: None, input_shape, batch_size })
    }

    /// Builds a pipeline using the configured model's input shape and preprocessing.
    pub fn from_config(extractor: &'e mut E, config: &PipelineConfig) -> Result<Self>
    {
        config.validate()?;
        let input_shape = config.model.input_shape(config.flavor)?;
        Ok(Self::new(extractor, input_shape, config.batch_size)?
            .with_preprocess(config.model.preprocess()))
    }

    pub fn with_preprocess(mut self, preprocess: impl Fn(&ImageTensor) -> ImageTensor + 'static) -> Self
    {
        self.preprocess = Some(Box::new(preprocess));
        self
    }

    pub fn input_shape(&self) -> InputShape
    {
        self.input_shape
    }

    pub fn batch_size(&self) -> usize
    {
        self.batch_size
    }

    /// Extracts features from already loaded images. See `features_from_images`.
    pub fn extract(&mut self, images: &[ImageTensor]) -> Result<FeatureMatrix>
    {
        features_from_images(images, &mut *self.extractor, self.preprocess.as_deref(), self.batch_size)
    }

    /// Loads, resizes and extracts features from image files.
    ///
    /// Files that fail to open are skipped. Returns the feature matrix together
    /// with the index into `paths` that each feature row was computed from.
    pub fn extract_files(&mut self, paths: &[PathBuf]) -> Result<(FeatureMatrix, Vec<usize>)>
    {
        let loaded = preprocessing::load_image_batch(paths, Some(self.input_shape));

        let mut images = Vec::with_capacity(loaded.len());
        let mut indices = Vec::with_capacity(loaded.len());
        for (index, image) in loaded.into_iter().enumerate()
        {
            match image {
                Some(image) => {
                    images.push(image);
                    indices.push(index);
                },
                None => warn!("Skipping {:?}; it could not be loaded", paths[index]),
            }
        }

        let features = self.extract(&images)?;
        Ok((features, indices))
    }
}
