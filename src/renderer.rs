use std::path::Path;

use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbImage};
use imageproc::map::map_colors;

use crate::errors::{Result, SegMaskError};
use crate::executor::ClassMask;
use crate::palette::{color_of, PALETTE};

/// Filter used to restore colorized masks to the original size.
pub const COLOR_RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Interpolation for label-space upsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelFilter {
    Nearest,
    #[default]
    Bicubic,
}

impl From<LabelFilter> for FilterType {
    fn from(filter: LabelFilter) -> Self {
        match filter {
            LabelFilter::Nearest => FilterType::Nearest,
            LabelFilter::Bicubic => FilterType::CatmullRom,
        }
    }
}

/// How a model-resolution mask is brought back to the size of its input image.
///
/// The label-space and color-space variants blur region boundaries differently and do not
/// produce identical files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Upsampling {
    /// Keep the model resolution.
    Off,
    /// Resize the class indices, then colorize.
    LabelSpace(LabelFilter),
    /// Colorize, then resize the colors.
    #[default]
    ColorSpace,
}

/// Smallest and largest class in `mask`, after checking every class has a color.
fn class_range(mask: &ClassMask) -> Result<Option<(u32, u32)>> {
    let mut range: Option<(u32, u32)> = None;
    for &Luma([class]) in mask.pixels() {
        color_of(class)?;
        range = Some(match range {
            Some((lo, hi)) => (lo.min(class), hi.max(class)),
            None => (class, class),
        });
    }
    Ok(range)
}

/// Maps every class to its palette color. No lossy step: each output pixel is exactly
/// `PALETTE[class]`.
pub fn colorize(mask: &ClassMask) -> Result<RgbImage> {
    class_range(mask)?;
    Ok(map_colors(mask, |Luma([class])| PALETTE[class as usize]))
}

/// Resizes a class mask as if it were an 8-bit grayscale image.
///
/// Every class fits in a byte once it has passed the palette check. Interpolated values are
/// rounded back to integers and clamped to the range of classes present in `mask`, so
/// overshoot near boundaries cannot invent classes outside that range. A bicubic kernel can
/// still produce an intermediate class between two neighbouring regions.
pub fn upsample_labels(
    mask: &ClassMask,
    size: (u32, u32),
    filter: LabelFilter,
) -> Result<ClassMask> {
    let Some((lo, hi)) = class_range(mask)? else {
        return Ok(mask.clone());
    };
    let (width, height) = size;
    if mask.dimensions() == size {
        return Ok(mask.clone());
    }

    let labels: GrayImage = map_colors(mask, |Luma([class])| Luma([class as u8]));
    let resized = imageops::resize(&labels, width, height, filter.into());
    Ok(map_colors(&resized, |Luma([class])| {
        Luma([u32::from(class).clamp(lo, hi)])
    }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaskRenderer {
    upsampling: Upsampling,
}

impl MaskRenderer {
    pub const fn new(upsampling: Upsampling) -> Self {
        Self { upsampling }
    }

    /// Colorizes `mask` and, unless upsampling is off, restores it to `original_size`.
    pub fn render(&self, mask: &ClassMask, original_size: (u32, u32)) -> Result<RgbImage> {
        let (width, height) = original_size;
        match self.upsampling {
            Upsampling::Off => colorize(mask),
            Upsampling::LabelSpace(filter) => {
                colorize(&upsample_labels(mask, original_size, filter)?)
            }
            Upsampling::ColorSpace => {
                let colored = colorize(mask)?;
                if colored.dimensions() == original_size {
                    Ok(colored)
                } else {
                    Ok(imageops::resize(&colored, width, height, COLOR_RESIZE_FILTER))
                }
            }
        }
    }

    /// Renders and writes one mask. The encoder is picked from the extension of `path`.
    pub fn write(&self, mask: &ClassMask, original_size: (u32, u32), path: &Path) -> Result<()> {
        let image = self.render(mask, original_size)?;
        image.save(path).map_err(|source| SegMaskError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
