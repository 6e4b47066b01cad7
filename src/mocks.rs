use ndarray::prelude::*;
use parking_lot::Mutex;

use crate::errors::{Result, SegMaskError};
use crate::model::Device;
use crate::traits::SegmentationModel;

/// Deterministic stand-in for a segmentation network.
///
/// Class `offset + k` scores the value of input channel `k`; every other class scores
/// negative infinity. After normalization that makes the predicted class the index of the
/// brightest channel, shifted by the offset. Batch sizes passed to `forward` are recorded.
#[derive(Debug)]
pub struct MockSegmentationModel {
    pub num_classes: usize,
    min_batch_size: usize,
    class_offset: usize,
    output_scale: usize,
    calls: Mutex<Vec<usize>>,
}

impl MockSegmentationModel {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            min_batch_size: 1,
            class_offset: 0,
            output_scale: 1,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Batches smaller than this make `forward` fail, like some exported graphs do.
    pub fn with_min_batch_size(mut self, min_batch_size: usize) -> Self {
        self.min_batch_size = min_batch_size;
        self
    }

    pub fn with_class_offset(mut self, class_offset: usize) -> Self {
        self.class_offset = class_offset;
        self
    }

    /// Scales the spatial size of the scores, producing output the pipeline must reject.
    pub fn with_output_scale(mut self, output_scale: usize) -> Self {
        self.output_scale = output_scale;
        self
    }

    pub fn forward_batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (n, channels, height, width) = input.dim();
        self.calls.lock().push(n);

        if n < self.min_batch_size {
            return Err(SegMaskError::model(
                "mock forward",
                format!("batch of {n} is below the minimum of {}", self.min_batch_size),
            ));
        }

        let scale = self.output_scale.max(1);
        let shape = (n, self.num_classes, height * scale, width * scale);
        Ok(Array4::from_shape_fn(shape, |(i, class, y, x)| {
            match class.checked_sub(self.class_offset) {
                Some(channel) if channel < channels => input[[i, channel, y / scale, x / scale]],
                _ => f32::NEG_INFINITY,
            }
        }))
    }

    fn min_batch_size(&self) -> usize {
        self.min_batch_size
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// Mock with one class per palette entry.
pub fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(22)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_model_creation() {
        let mock = create_mock_model();
        assert_eq!(mock.num_classes, 22);
        assert_eq!(mock.min_batch_size(), 1);
    }

    #[test]
    fn test_mock_model_forward_shape() -> Result<()> {
        let mock = create_mock_model();
        let scores = mock.forward(Array4::<f32>::zeros((2, 3, 8, 6)).view())?;
        assert_eq!(scores.shape(), &[2, 22, 8, 6]);
        assert_eq!(mock.forward_batch_sizes(), [2]);
        Ok(())
    }

    #[test]
    fn test_mock_model_offset_scores() -> Result<()> {
        let mock = MockSegmentationModel::new(5).with_class_offset(2);
        let mut input = Array4::<f32>::zeros((1, 3, 1, 1));
        input[[0, 1, 0, 0]] = 0.5;

        let scores = mock.forward(input.view())?;
        assert_eq!(scores[[0, 0, 0, 0]], f32::NEG_INFINITY);
        assert_eq!(scores[[0, 3, 0, 0]], 0.5);
        Ok(())
    }

    #[test]
    fn test_mock_model_rejects_small_batches() {
        let mock = create_mock_model().with_min_batch_size(2);
        assert!(mock.forward(Array4::<f32>::zeros((1, 3, 2, 2)).view()).is_err());
    }
}
