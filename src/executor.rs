use image::{ImageBuffer, Luma};
use ndarray::prelude::*;
use tracing::debug;

use crate::errors::{Result, SegMaskError};
use crate::traits::SegmentationModel;

/// Per-pixel class indices of one image.
pub type ClassMask = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Per-channel mean and standard deviation, in the channel order of the input tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationParams {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl NormalizationParams {
    pub const IMAGENET: Self = Self {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        if let Some(m) = mean.iter().find(|m| !m.is_finite()) {
            return Err(SegMaskError::validation("mean", format!("must be finite, got {m}")));
        }
        if let Some(s) = std.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(SegMaskError::validation(
                "std",
                format!("must be finite and greater than 0, got {s}"),
            ));
        }
        Ok(Self { mean, std })
    }

    fn broadcastable(values: [f32; 3]) -> Array4<f32> {
        Array4::from_shape_fn((1, 3, 1, 1), |(_, c, _, _)| values[c])
    }
}

impl Default for NormalizationParams {
    fn default() -> Self {
        Self::IMAGENET
    }
}

/// Class index with the highest score along each `[N, C, h, w]` class lane.
///
/// Ties go to the lowest index and NaN scores never win.
pub fn argmax_classes(scores: ArrayView4<f32>) -> Array3<u32> {
    scores.map_axis(Axis(1), |lane| {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (class, &score) in lane.iter().enumerate() {
            if score > best_score {
                best = class;
                best_score = score;
            }
        }
        best as u32
    })
}

/// Runs normalized batches through a model and reduces the scores to class masks.
pub struct InferenceExecutor<'m, M: SegmentationModel + ?Sized> {
    model: &'m M,
    mean: Array4<f32>,
    std: Array4<f32>,
}

impl<'m, M: SegmentationModel + ?Sized> InferenceExecutor<'m, M> {
    pub fn new(model: &'m M, normalization: NormalizationParams) -> Self {
        Self {
            model,
            mean: NormalizationParams::broadcastable(normalization.mean),
            std: NormalizationParams::broadcastable(normalization.std),
        }
    }

    /// Returns one mask per image of `batch`, in order.
    ///
    /// A batch smaller than the model's minimum is padded with copies of its last image and
    /// the padded results are dropped.
    pub fn run(&self, batch: ArrayView4<f32>) -> Result<Vec<ClassMask>> {
        let (n, channels, height, width) = batch.dim();
        if n == 0 {
            return Err(SegMaskError::validation("batch", "must contain at least one image"));
        }
        if channels != 3 {
            return Err(SegMaskError::validation(
                "batch",
                format!("must have 3 channels, got {channels}"),
            ));
        }

        let min_batch_size = self.model.min_batch_size();
        let mut input = if n < min_batch_size {
            debug!(n, min_batch_size, "padding batch up to the model minimum");
            let last = batch.clone().slice_move(s![n - 1..n, .., .., ..]);
            let mut parts = vec![batch];
            parts.resize(min_batch_size - n + 1, last);
            ndarray::concatenate(Axis(0), &parts)?
        } else {
            batch.to_owned()
        };
        input -= &self.mean;
        input /= &self.std;

        let expected_n = input.len_of(Axis(0));
        let scores = {
            let _span = tracing::debug_span!("forward", batch = expected_n).entered();
            self.model.forward(input.view())?
        };

        let (out_n, num_classes, out_height, out_width) = scores.dim();
        if out_n != expected_n || num_classes == 0 || (out_height, out_width) != (height, width) {
            return Err(SegMaskError::model(
                "output shape check",
                format!(
                    "expected [{expected_n}, C, {height}, {width}] scores, got {:?}",
                    scores.shape()
                ),
            ));
        }

        let classes = argmax_classes(scores.slice(s![..n, .., .., ..]));
        classes
            .outer_iter()
            .map(|mask| {
                let raw = mask.iter().copied().collect();
                ImageBuffer::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
                    SegMaskError::model("class mask conversion", "buffer size mismatch")
                })
            })
            .collect()
    }
}
