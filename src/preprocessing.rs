/// Preprocessing of uploaded image bytes into the input tensor expected by the
/// MobileNetV3 classifiers. The steps and their order must stay exactly as they
/// are: decode, force RGB, stretch to 224x224, convert to f32, normalize, batch.
/// The models were trained against this pipeline and silently degrade otherwise.

use clap::ValueEnum;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, ArrayView4};

use crate::error::DecodeError;

pub const IMAGE_INPUT_SIZE: usize = 224;
pub const CHANNELS: usize = 3;

/// How pixel values in [0, 255] are mapped before being handed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Normalization
{
	/// Values stay in [0, 255]. MobileNetV3 carries its own rescaling layer.
	#[default]
	Passthrough,
	/// Linear map onto [-1, 1].
	Symmetric,
	/// Linear map onto [0, 1].
	Unit,
}

impl Normalization
{
	pub fn apply(&self, value: f32) -> f32
	{
		match self
		{
			Normalization::Passthrough => value,
			Normalization::Symmetric => value / 127.5 - 1.0,
			Normalization::Unit => value / 255.0,
		}
	}

	/// Inclusive bounds of every value this scheme can produce.
	pub fn range(&self) -> (f32, f32)
	{
		(self.apply(0.0), self.apply(255.0))
	}
}

/// A single normalized image of shape (1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS), NHWC.
/// Only `preprocess` and `image_to_tensor` construct it, so the shape always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor
{
	pub fn view(&self) -> ArrayView4<'_, f32>
	{
		self.0.view()
	}

	pub fn shape(&self) -> &[usize]
	{
		self.0.shape()
	}

	pub fn into_array(self) -> Array4<f32>
	{
		self.0
	}
}

/// Decodes `bytes` and converts the result into the classifier input tensor.
/// The image format is sniffed from the content, not from any file name.
pub fn preprocess(bytes: &[u8], normalization: Normalization) -> Result<ImageTensor, DecodeError>
{
	let img = decode_image(bytes)?;
	Ok(image_to_tensor(&img, normalization))
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DecodeError>
{
	Ok(image::load_from_memory(bytes)?)
}

// Alpha is dropped, not composited, and grayscale is replicated across channels.
// The resize stretches; aspect ratio is intentionally not preserved.
pub fn image_to_tensor(img: &DynamicImage, normalization: Normalization) -> ImageTensor
{
	let rgb = img.to_rgb8();
	let resized = image::imageops::resize(
		&rgb,
		IMAGE_INPUT_SIZE as u32,
		IMAGE_INPUT_SIZE as u32,
		FilterType::CatmullRom);

	let mut image_input = Array4::zeros((1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS));
	for (x, y, pixel) in resized.enumerate_pixels()
	{
		let x = x as usize;
		let y = y as usize;
		let [r, g, b] = pixel.0;
		image_input[[0, y, x, 0]] = normalization.apply(r as f32);
		image_input[[0, y, x, 1]] = normalization.apply(g as f32);
		image_input[[0, y, x, 2]] = normalization.apply(b as f32);
	}

	ImageTensor(image_input)
}

#[cfg(test)]
pub(crate) mod tests
{
	use std::io::Cursor;

	use approx::assert_abs_diff_eq;
	use image::{GrayImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

	use super::*;

	pub(crate) fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8>
	{
		let mut bytes = Vec::new();
		img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
		bytes
	}

	pub(crate) fn solid_rgb_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8>
	{
		let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
		encode(&img, ImageFormat::Png)
	}

	fn gradient(width: u32, height: u32) -> DynamicImage
	{
		DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
			Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
		}))
	}

	fn assert_channels(tensor: &ImageTensor, expected: [f32; 3])
	{
		for pixel in tensor.view().index_axis(ndarray::Axis(0), 0).rows()
		{
			for c in 0..CHANNELS
			{
				assert_abs_diff_eq!(pixel[c], expected[c], epsilon = 1.0);
			}
		}
	}

	#[test]
	fn test_shape_is_fixed_for_any_input_size()
	{
		for (w, h) in [(1, 1), (500, 500), (640, 480), (31, 977)]
		{
			let bytes = encode(&gradient(w, h), ImageFormat::Png);
			let tensor = preprocess(&bytes, Normalization::Passthrough).unwrap();
			assert_eq!(tensor.shape(), &[1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS]);
		}
	}

	#[test]
	fn test_jpeg_input()
	{
		let bytes = encode(&gradient(500, 500), ImageFormat::Jpeg);
		let tensor = preprocess(&bytes, Normalization::Passthrough).unwrap();
		assert_eq!(tensor.shape(), &[1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS]);
	}

	#[test]
	fn test_passthrough_keeps_pixel_values()
	{
		let bytes = solid_rgb_png(300, 120, [10, 20, 30]);
		let tensor = preprocess(&bytes, Normalization::Passthrough).unwrap();
		assert_channels(&tensor, [10.0, 20.0, 30.0]);
	}

	#[test]
	fn test_rgba_drops_alpha()
	{
		let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([200, 100, 50, 0])));
		let bytes = encode(&img, ImageFormat::Png);
		let tensor = preprocess(&bytes, Normalization::Passthrough).unwrap();
		assert_eq!(tensor.shape(), &[1, IMAGE_INPUT_SIZE, IMAGE_INPUT_SIZE, CHANNELS]);
		assert_channels(&tensor, [200.0, 100.0, 50.0]);
	}

	#[test]
	fn test_grayscale_is_replicated()
	{
		let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 90, image::Luma([128])));
		let bytes = encode(&img, ImageFormat::Png);
		let tensor = preprocess(&bytes, Normalization::Passthrough).unwrap();
		assert_channels(&tensor, [128.0, 128.0, 128.0]);
	}

	#[test]
	fn test_resize_stretches_without_cropping()
	{
		// Left half red, right half blue. A crop or letterbox would lose or pad one side.
		let img = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
			if x == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
		}));
		let tensor = image_to_tensor(&img, Normalization::Passthrough);
		let view = tensor.view();
		for y in [0, 112, 223]
		{
			assert!(view[[0, y, 5, 0]] > view[[0, y, 5, 2]]);
			assert!(view[[0, y, 218, 2]] > view[[0, y, 218, 0]]);
		}
	}

	#[test]
	fn test_values_stay_in_normalized_range()
	{
		let img = gradient(300, 300);
		for normalization in [Normalization::Passthrough, Normalization::Symmetric, Normalization::Unit]
		{
			let (low, high) = normalization.range();
			let tensor = image_to_tensor(&img, normalization);
			assert!(tensor.view().iter().all(|v| *v >= low && *v <= high));
		}
	}

	#[test]
	fn test_normalization_endpoints()
	{
		assert_abs_diff_eq!(Normalization::Symmetric.apply(0.0), -1.0);
		assert_abs_diff_eq!(Normalization::Symmetric.apply(255.0), 1.0);
		assert_abs_diff_eq!(Normalization::Unit.apply(255.0), 1.0);
		assert_abs_diff_eq!(Normalization::Passthrough.apply(42.0), 42.0);
		assert_eq!(Normalization::Passthrough.range(), (0.0, 255.0));
	}

	#[test]
	fn test_non_image_bytes_fail_to_decode()
	{
		assert!(preprocess(b"definitely not an image", Normalization::Passthrough).is_err());
		assert!(preprocess(&[], Normalization::Passthrough).is_err());
	}

	#[test]
	fn test_truncated_png_fails_to_decode()
	{
		let bytes = solid_rgb_png(32, 32, [1, 2, 3]);
		let truncated = &bytes[..bytes.len() / 2];
		assert!(preprocess(truncated, Normalization::Passthrough).is_err());
	}
}
