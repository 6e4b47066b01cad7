use std::path::PathBuf;

use ndarray::prelude::*;
use rayon::prelude::*;

use crate::errors::{Result, SegMaskError};
use crate::loader::{ImageLoader, InputImage};

/// Batch size actually used: the requested size, raised to what the model accepts.
pub fn effective_batch_size(requested: usize, model_min_batch_size: usize) -> Result<usize> {
    if requested == 0 {
        return Err(SegMaskError::validation("batch size", "must be at least 1"));
    }
    Ok(requested.max(model_min_batch_size))
}

/// Splits an ordered file list into contiguous slices of the effective batch size.
///
/// The effective size is fixed at construction; only the last slice may be shorter.
#[derive(Debug, Clone, Copy)]
pub struct Batcher<'a> {
    files: &'a [PathBuf],
    batch_size: usize,
}

impl<'a> Batcher<'a> {
    pub fn new(
        files: &'a [PathBuf],
        requested: usize,
        model_min_batch_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            files,
            batch_size: effective_batch_size(requested, model_min_batch_size)?,
        })
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of slices `iter` yields.
    pub const fn batch_count(&self) -> usize {
        self.files.len().div_ceil(self.batch_size)
    }

    pub fn iter(&self) -> std::slice::Chunks<'a, PathBuf> {
        self.files.chunks(self.batch_size)
    }
}

impl<'a> IntoIterator for Batcher<'a> {
    type Item = &'a [PathBuf];
    type IntoIter = std::slice::Chunks<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A group of loaded images and their stacked `[N, 3, H, W]` tensor.
#[derive(Debug)]
pub struct Batch {
    pub images: Vec<InputImage>,
    pub tensor: Array4<f32>,
}

impl Batch {
    /// Decodes a slice of files. Decoding runs in parallel, but errors are reported in input
    /// order so the same file fails first on every run.
    pub fn load(loader: &ImageLoader, paths: &[PathBuf]) -> Result<Self> {
        let loaded: Vec<Result<_>> = paths.par_iter().map(|path| loader.load(path)).collect();
        let loaded = loaded.into_iter().collect::<Result<Vec<_>>>()?;
        Self::stack(loaded)
    }

    pub fn stack(items: Vec<(Array4<f32>, InputImage)>) -> Result<Self> {
        let Some((first, _)) = items.first() else {
            return Err(SegMaskError::validation("batch", "must contain at least one image"));
        };
        let (_, channels, height, width) = first.dim();

        let mut tensor = Array4::<f32>::zeros((items.len(), channels, height, width));
        let mut images = Vec::with_capacity(items.len());
        for (i, (item, image)) in items.into_iter().enumerate() {
            if item.dim() != (1, channels, height, width) {
                return Err(SegMaskError::validation(
                    "batch",
                    format!(
                        "image {} has tensor shape {:?}, expected {:?}",
                        image.path.display(),
                        item.shape(),
                        [1, channels, height, width]
                    ),
                ));
            }
            tensor.slice_mut(s![i..i + 1, .., .., ..]).assign(&item);
            images.push(image);
        }

        Ok(Self { images, tensor })
    }
}
