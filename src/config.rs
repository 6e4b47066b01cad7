use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use image::ImageFormat;

use crate::errors::Result;
use crate::executor::NormalizationParams;
use crate::loader::ChannelOrder;
use crate::model::Device;
use crate::renderer::{LabelFilter, Upsampling};
use crate::PipelineOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    /// CUDA when available, CPU otherwise
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpsamplingArg {
    /// Colorize at model resolution, then resize the colors
    Color,
    /// Resize class indices with a bicubic kernel, then colorize
    Label,
    /// Resize class indices with nearest neighbour, then colorize
    LabelNearest,
    /// Keep the model resolution
    Off,
}

impl From<UpsamplingArg> for Upsampling {
    fn from(arg: UpsamplingArg) -> Self {
        match arg {
            UpsamplingArg::Color => Self::ColorSpace,
            UpsamplingArg::Label => Self::LabelSpace(LabelFilter::Bicubic),
            UpsamplingArg::LabelNearest => Self::LabelSpace(LabelFilter::Nearest),
            UpsamplingArg::Off => Self::Off,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image file or directory of images
    pub input: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    /// Pre-trained model name or path to an ONNX file
    #[arg(short, long, default_value = "unet")]
    pub model: String,

    /// Directory holding the pre-trained `<name>.onnx` files
    #[arg(long, default_value = "models")]
    pub model_root: PathBuf,

    /// Overrides the minimum batch size the model accepts
    #[arg(long, value_parser = positive())]
    pub min_batch_size: Option<u32>,

    #[arg(short, long, value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,

    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(short, long, default_value_t = 1, value_parser = positive())]
    pub batch_size: u32,

    /// Model input width
    #[arg(short = 'W', long, default_value_t = 224, value_parser = positive())]
    pub width: u32,

    /// Model input height
    #[arg(short = 'H', long, default_value_t = 224, value_parser = positive())]
    pub height: u32,

    /// Per-channel mean, comma separated
    #[arg(long, default_value = "0.485,0.456,0.406", value_parser = parse_triple)]
    pub mean: [f32; 3],

    /// Per-channel standard deviation, comma separated
    #[arg(long, default_value = "0.229,0.224,0.225", value_parser = parse_triple)]
    pub std: [f32; 3],

    #[arg(long, value_enum, default_value_t = ChannelOrder::Rgb)]
    pub channel_order: ChannelOrder,

    #[arg(long, value_enum, default_value_t = UpsamplingArg::Color)]
    pub upsampling: UpsamplingArg,

    /// Output extension; by default masks keep the input file name
    #[arg(short, long, value_parser = check_format)]
    pub format: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub fn device(&self) -> Device {
        match self.device {
            DeviceArg::Auto => Device::detect(self.device_id),
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda {
                device_id: self.device_id,
            },
        }
    }

    pub fn normalization(&self) -> Result<NormalizationParams> {
        NormalizationParams::new(self.mean, self.std)
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        Ok(PipelineOptions {
            batch_size: self.batch_size as usize,
            width: self.width,
            height: self.height,
            normalization: self.normalization()?,
            channel_order: self.channel_order,
            upsampling: self.upsampling.into(),
        })
    }
}

fn positive() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..)
}

fn parse_triple(s: &str) -> std::result::Result<[f32; 3], String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .map_err(|e| format!("`{}` is not a number: {e}", v.trim()))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    <[f32; 3]>::try_from(values)
        .map_err(|values| format!("expected 3 comma separated values, got {}", values.len()))
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}
