//! Image loading and model input preprocessing for feature extraction.
//! Images are kept as (height, width, channels) f32 tensors with 0-255 values
//! until a model-specific preprocessing function is applied.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage};
use log::warn;
use ndarray::{s, Array3, Axis};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::{Error, Result};
use crate::models::{ImageTensor, InputShape};

// ImageNet channel means in BGR order, as used by the VGG family.
const VGG_BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

pub fn open_image(path: &Path) -> Result<DynamicImage>
{
	image::open(path).map_err(|source| Error::ImageOpen { path: path.to_path_buf(), source })
}

/// Loads an RGB image tensor, or `None` if the file is missing or not a readable image.
pub fn load_image(path: &Path) -> Option<ImageTensor>
{
	load_image_with_shape(path, None)
}

fn load_image_with_shape(path: &Path, input_shape: Option<InputShape>) -> Option<ImageTensor>
{
	match open_image(path)
	{
		Ok(img) =>
		{
			let img = match input_shape
			{
				Some(shape) => resize_image(&img, shape),
				None => img,
			};
			Some(image_to_tensor(&img))
		}
		Err(e) =>
		{
			warn!("Error loading image: {}", e);
			None
		}
	}
}

pub fn load_image_batch(paths: &[PathBuf], input_shape: Option<InputShape>) -> Vec<Option<ImageTensor>>
{
	// Load the images in parallel; collect() keeps the input order.
	paths.par_iter().map(
	{
		| path |
		{
			load_image_with_shape(path, input_shape)
		}
	}).collect::<Vec<Option<ImageTensor>>>()
}

/// Resizes to exactly the (height, width) of `input_shape`, ignoring aspect ratio.
pub fn resize_image(img: &DynamicImage, input_shape: InputShape) -> DynamicImage
{
	img.resize_exact(input_shape.width, input_shape.height, FilterType::CatmullRom)
}

pub fn image_to_tensor(img: &DynamicImage) -> ImageTensor
{
	let rgb = img.to_rgb8();
	let (width, height) = rgb.dimensions();
	let mut tensor = Array3::zeros((height as usize, width as usize, 3));
	for (x, y, pixel) in rgb.enumerate_pixels()
	{
		let [r, g, b] = pixel.0;
		tensor[[y as usize, x as usize, 0]] = r as f32;
		tensor[[y as usize, x as usize, 1]] = g as f32;
		tensor[[y as usize, x as usize, 2]] = b as f32;
	}

	tensor
}

/// Scales 0-255 pixels to [-1, 1].
pub fn inception_preprocess(image: &ImageTensor) -> ImageTensor
{
	image.mapv(|v| v / 127.5 - 1.0)
}

/// Converts RGB to BGR and subtracts the ImageNet channel means.
pub fn vgg16_preprocess(image: &ImageTensor) -> ImageTensor
{
	let mut bgr = image.slice(s![.., .., ..;-1]).to_owned();
	for (mut channel, mean) in bgr.axis_iter_mut(Axis(2)).zip(VGG_BGR_MEANS)
	{
		channel -= mean;
	}

	bgr
}
