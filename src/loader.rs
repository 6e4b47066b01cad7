use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, ImageError, ImageReader, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{Result, SegMaskError};

/// Filter used to bring every input to the model's input size.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Channel layout of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// An input file together with the size it had on disk, kept to restore the mask to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    pub path: PathBuf,
    /// `(width, height)`
    pub original_size: (u32, u32),
}

/// Reads images and turns them into `[1, 3, height, width]` tensors scaled to `[0, 1]`.
///
/// Inputs are stretched to the target size regardless of aspect ratio, so masks restored to
/// the original size inherit that distortion.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    width: u32,
    height: u32,
    channel_order: ChannelOrder,
}

impl ImageLoader {
    pub fn new(width: u32, height: u32, channel_order: ChannelOrder) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegMaskError::validation(
                "input size",
                format!("must be non-zero, got {width}x{height}"),
            ));
        }
        Ok(Self {
            width,
            height,
            channel_order,
        })
    }

    pub fn load(&self, path: &Path) -> Result<(Array4<f32>, InputImage)> {
        let decode_error = |source: ImageError| SegMaskError::Decode {
            path: path.to_path_buf(),
            source,
        };
        // The content decides the decoder; the extension is only a hint.
        let image = ImageReader::open(path)
            .map_err(|e| decode_error(ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| decode_error(ImageError::IoError(e)))?
            .decode()
            .map_err(decode_error)?
            .into_rgb8();
        let original_size = image.dimensions();

        Ok((
            self.to_tensor(&image),
            InputImage {
                path: path.to_path_buf(),
                original_size,
            },
        ))
    }

    pub fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let resized;
        let image = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            resized = imageops::resize(image, self.width, self.height, RESIZE_FILTER);
            &resized
        };

        let chw = image.as_ndarray3();
        let tensor = match self.channel_order {
            ChannelOrder::Rgb => chw.slice_move(s![NewAxis, .., .., ..]),
            ChannelOrder::Bgr => chw.slice_move(s![NewAxis, ..;-1, .., ..]),
        };
        tensor.mapv(|v| f32::from(v) / 255.0)
    }
}
