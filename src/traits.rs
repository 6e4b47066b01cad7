use std::path::{Path, PathBuf};

use ndarray::prelude::*;

use crate::errors::Result;
use crate::model::Device;

/// A semantic segmentation model seen as a capability.
///
/// `forward` takes a normalized `[N, 3, H, W]` batch and returns per-class scores shaped
/// `[N, C, H, W]`. Implementations must be pointwise in the batch axis: the scores for one
/// image do not depend on which other images share its batch.
pub trait SegmentationModel: Send + Sync {
    fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Smallest batch the model accepts. Some exported graphs fail below 2.
    fn min_batch_size(&self) -> usize {
        1
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).forward(input)
    }

    fn min_batch_size(&self) -> usize {
        (**self).min_batch_size()
    }

    fn device(&self) -> Device {
        (**self).device()
    }
}

/// Maps an input image path to the file its mask is written to.
pub trait OutputPathGenerator {
    fn output_path(&self, input: &Path) -> PathBuf;
}

impl<F> OutputPathGenerator for F
where
    F: Fn(&Path) -> PathBuf,
{
    fn output_path(&self, input: &Path) -> PathBuf {
        self(input)
    }
}
