pub mod batch;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod files;
pub mod loader;
pub mod model;
pub mod palette;
pub mod renderer;
pub mod traits;

pub mod mocks;

use std::path::PathBuf;

use indicatif::ProgressBar;
use tracing::{debug, error, info};

pub use batch::{Batch, Batcher};
pub use config::Config;
pub use errors::{Result, SegMaskError};
pub use executor::{ClassMask, InferenceExecutor, NormalizationParams};
pub use files::{collect_inputs, OutputPaths};
pub use loader::{ChannelOrder, ImageLoader, InputImage};
pub use model::{Device, GraphModel, Model};
pub use renderer::{LabelFilter, MaskRenderer, Upsampling};
pub use traits::*;

#[cfg(test)]
pub use mocks::*;

/// Everything about a run that is not the model, the inputs or the output location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    /// Requested batch size; raised to the model's minimum if smaller.
    pub batch_size: usize,
    pub width: u32,
    pub height: u32,
    pub normalization: NormalizationParams,
    pub channel_order: ChannelOrder,
    pub upsampling: Upsampling,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            width: 224,
            height: 224,
            normalization: NormalizationParams::IMAGENET,
            channel_order: ChannelOrder::Rgb,
            upsampling: Upsampling::ColorSpace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub images: usize,
    pub batches: usize,
}

/// Drives files through loading, batching, inference and rendering, one batch at a time.
///
/// The first failing image aborts the run. Masks already written stay on disk.
pub struct SegmentationPipeline<'a, M: SegmentationModel + ?Sized, O: OutputPathGenerator> {
    model: &'a M,
    outputs: O,
    options: PipelineOptions,
    loader: ImageLoader,
    renderer: MaskRenderer,
    progress: ProgressBar,
}

impl<'a, M: SegmentationModel + ?Sized, O: OutputPathGenerator> SegmentationPipeline<'a, M, O> {
    pub fn new(model: &'a M, outputs: O, options: PipelineOptions) -> Result<Self> {
        let loader = ImageLoader::new(options.width, options.height, options.channel_order)?;
        Ok(Self {
            model,
            outputs,
            options,
            loader,
            renderer: MaskRenderer::new(options.upsampling),
            progress: ProgressBar::hidden(),
        })
    }

    /// Advanced once per written mask.
    pub fn with_progress_bar(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, files: &[PathBuf]) -> Result<RunReport> {
        let batcher =
            Batcher::new(files, self.options.batch_size, self.model.min_batch_size())?;
        let executor = InferenceExecutor::new(self.model, self.options.normalization);
        info!(
            images = files.len(),
            batch_size = batcher.batch_size(),
            batches = batcher.batch_count(),
            device = %self.model.device(),
            "starting segmentation"
        );

        let mut report = RunReport::default();
        for (index, paths) in batcher.into_iter().enumerate() {
            debug!(batch = index, size = paths.len(), "processing batch");
            let batch = Batch::load(&self.loader, paths)?;
            let masks = executor.run(batch.tensor.view())?;

            for (image, mask) in batch.images.iter().zip(&masks) {
                let output = self.outputs.output_path(&image.path);
                self.renderer.write(mask, image.original_size, &output)?;
                debug!(
                    input = %image.path.display(),
                    output = %output.display(),
                    "mask written"
                );
                self.progress.inc(1);
            }
            report.images += batch.images.len();
            report.batches += 1;
        }

        info!(images = report.images, batches = report.batches, "segmentation finished");
        Ok(report)
    }

    /// Runs the pipeline and reports only whether every image was written.
    pub fn process(&self, files: &[PathBuf]) -> bool {
        match self.run(files) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "segmentation aborted");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn write_image(path: &Path, color: [u8; 3]) -> Result<()> {
        RgbImage::from_pixel(12, 8, Rgb(color))
            .save(path)
            .map_err(|source| SegMaskError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    fn small_options() -> PipelineOptions {
        PipelineOptions {
            width: 8,
            height: 8,
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn run_reports_images_and_batches() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let files: Vec<_> = (0..5)
            .map(|i| temp_dir.path().join(format!("{i}.png")))
            .collect();
        for file in &files {
            write_image(file, [200, 10, 10])?;
        }
        let out_dir = temp_dir.path().join("out");
        let model = create_mock_model();
        let options = PipelineOptions {
            batch_size: 2,
            ..small_options()
        };

        let pipeline = SegmentationPipeline::new(&model, OutputPaths::new(&out_dir)?, options)?;
        let report = pipeline.run(&files)?;

        assert_eq!(report, RunReport { images: 5, batches: 3 });
        assert_eq!(model.forward_batch_sizes(), [2, 2, 1]);
        for file in &files {
            let written = image::open(out_dir.join(file.file_name().unwrap())).unwrap();
            assert_eq!(written.into_rgb8().dimensions(), (12, 8));
        }
        Ok(())
    }

    #[test]
    fn closures_generate_output_paths() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("in.png");
        write_image(&input, [10, 10, 200])?;
        let target = temp_dir.path().join("mask.png");
        let model = create_mock_model();

        let outputs = |_: &Path| target.clone();
        let pipeline = SegmentationPipeline::new(&model, outputs, small_options())?;
        assert!(pipeline.process(&[input]));
        assert!(target.is_file());
        Ok(())
    }

    #[test]
    fn empty_input_list_succeeds() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model = create_mock_model();
        let outputs = OutputPaths::new(temp_dir.path())?;
        let pipeline = SegmentationPipeline::new(&model, outputs, small_options())?;

        assert_eq!(pipeline.run(&[])?, RunReport::default());
        assert!(model.forward_batch_sizes().is_empty());
        Ok(())
    }

    #[test]
    fn zero_batch_size_fails_the_run() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model = create_mock_model();
        let options = PipelineOptions {
            batch_size: 0,
            ..small_options()
        };
        let outputs = OutputPaths::new(temp_dir.path())?;
        let pipeline = SegmentationPipeline::new(&model, outputs, options)?;

        assert!(matches!(pipeline.run(&[]), Err(SegMaskError::Validation { .. })));
        assert!(!pipeline.process(&[]));
        Ok(())
    }

    #[test]
    fn model_handle_drives_the_pipeline() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("in.png");
        write_image(&input, [10, 200, 10])?;
        let model = Model::native(create_mock_model());

        let outputs = OutputPaths::new(temp_dir.path().join("out"))?;
        let pipeline = SegmentationPipeline::new(&model, outputs, small_options())?;
        assert_eq!(pipeline.run(&[input])?.images, 1);
        Ok(())
    }
}
