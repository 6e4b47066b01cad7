use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use segmask_rs::{
    catalog, collect_inputs, Config, GraphModel, Model, OutputPaths, SegmentationPipeline,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new();

    ensure!(config.input.exists(), "Input path does not exist");
    let options = config.pipeline_options()?;

    let source = catalog::resolve(&config.model, &config.model_root)?;
    let min_batch_size = config
        .min_batch_size
        .map_or(source.min_batch_size, |n| n as usize);
    let graph = GraphModel::load(&source.path, config.device(), min_batch_size)?;
    if let Some(size) = graph.input_size() {
        if size != (options.width, options.height) {
            warn!(
                model = ?size,
                requested = ?(options.width, options.height),
                "model declares a fixed input size different from the requested one"
            );
        }
    }
    graph
        .warm_up(options.width, options.height)
        .with_context(|| format!("Failed to warm up model: {}", graph.path().display()))?;
    let model = Model::from(graph);

    let files = collect_inputs(&config.input)?;
    if files.is_empty() {
        info!(input = %config.input.display(), "no images to process");
        return Ok(());
    }
    let outputs = OutputPaths::new(&config.output_dir)?.with_extension(config.format.clone());

    let progress_bar = ProgressBar::new(files.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let pipeline = SegmentationPipeline::new(&model, outputs, options)?
        .with_progress_bar(progress_bar.clone());
    let succeeded = pipeline.process(&files);
    progress_bar.finish();

    ensure!(succeeded, "Segmentation failed, see the log for the cause");
    Ok(())
}
