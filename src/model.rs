use std::{
    fmt,
    path::{Path, PathBuf},
};

use ndarray::prelude::*;
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    errors::{Result, SegMaskError},
    traits::SegmentationModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: i32 },
}

impl Device {
    /// Picks CUDA when the linked ONNX Runtime build includes the CUDA execution provider.
    ///
    /// No device is probed here; a missing GPU surfaces when the session is created.
    pub fn detect(device_id: i32) -> Self {
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => Self::Cuda { device_id },
            _ => Self::Cpu,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

/// A serialized ONNX graph run by ONNX Runtime.
pub struct GraphModel {
    path: PathBuf,
    device: Device,
    min_batch_size: usize,
    input_name: String,
    output_name: String,
    input_size: Option<(u32, u32)>,
    session: Mutex<Session>,
}

impl GraphModel {
    pub fn load(model_path: &Path, device: Device, min_batch_size: usize) -> Result<Self> {
        let load_error = |message: String| {
            move |e: ort::Error| SegMaskError::ModelLoad {
                message,
                source: Some(Box::new(e)),
            }
        };

        if !model_path.is_file() {
            return Err(SegMaskError::ModelLoad {
                message: format!("model file not found: {}", model_path.display()),
                source: None,
            });
        }

        let mut builder = SessionBuilder::new()
            .map_err(load_error("session builder initialization".to_string()))?;
        if let Device::Cuda { device_id } = device {
            builder = builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .map_err(load_error("execution provider registration".to_string()))?;
        }
        let session = builder
            .with_memory_pattern(true)
            .map_err(load_error("memory pattern configuration".to_string()))?
            .commit_from_file(model_path)
            .map_err(load_error(format!(
                "loading model file {}",
                model_path.display()
            )))?;

        let (input_name, input_size) = session
            .inputs
            .first()
            .map(|input| {
                let size = input.input_type.tensor_shape().and_then(|shape| {
                    (shape.len() == 4 && shape[2] > 0 && shape[3] > 0)
                        .then(|| (shape[3] as u32, shape[2] as u32))
                });
                (input.name.clone(), size)
            })
            .ok_or_else(|| SegMaskError::ModelLoad {
                message: format!("{} declares no inputs", model_path.display()),
                source: None,
            })?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| SegMaskError::ModelLoad {
                message: format!("{} declares no outputs", model_path.display()),
                source: None,
            })?;

        info!(
            model = %model_path.display(),
            %device,
            input = %input_name,
            output = %output_name,
            "model loaded"
        );

        Ok(Self {
            path: model_path.to_path_buf(),
            device,
            min_batch_size: min_batch_size.max(1),
            input_name,
            output_name,
            input_size,
            session: Mutex::new(session),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Static `(width, height)` of the graph input, if the graph fixes it.
    pub const fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    /// Runs one zero batch of the minimum size through the session.
    pub fn warm_up(&self, width: u32, height: u32) -> Result<()> {
        let data = Array4::<f32>::zeros((
            self.min_batch_size,
            3,
            height as usize,
            width as usize,
        ));
        self.forward(data.view())?;
        debug!(width, height, "model warmed up");
        Ok(())
    }
}

impl SegmentationModel for GraphModel {
    fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let input = input.as_standard_layout();
        let tensor = TensorRef::from_array_view(input.view())?;
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| SegMaskError::model("forward pass", e))?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }

    fn min_batch_size(&self) -> usize {
        self.min_batch_size
    }

    fn device(&self) -> Device {
        self.device
    }
}

/// Handle over the two kinds of model the pipeline can drive.
pub enum Model {
    /// Serialized graph executed by ONNX Runtime.
    Graph(GraphModel),
    /// Any in-process implementation.
    Native(Box<dyn SegmentationModel>),
}

impl Model {
    pub fn native<M: SegmentationModel + 'static>(model: M) -> Self {
        Self::Native(Box::new(model))
    }
}

impl From<GraphModel> for Model {
    fn from(model: GraphModel) -> Self {
        Self::Graph(model)
    }
}

impl SegmentationModel for Model {
    fn forward(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        match self {
            Self::Graph(model) => model.forward(input),
            Self::Native(model) => model.forward(input),
        }
    }

    fn min_batch_size(&self) -> usize {
        match self {
            Self::Graph(model) => model.min_batch_size(),
            Self::Native(model) => model.min_batch_size(),
        }
    }

    fn device(&self) -> Device {
        match self {
            Self::Graph(model) => model.device(),
            Self::Native(model) => model.device(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockSegmentationModel;

    #[test]
    fn missing_graph_file_is_a_load_error() {
        let result = GraphModel::load(Path::new("does/not/exist.onnx"), Device::Cpu, 1);
        assert!(matches!(result, Err(SegMaskError::ModelLoad { .. })));
    }

    #[test]
    fn native_handle_dispatches_to_inner_model() -> Result<()> {
        let model = Model::native(MockSegmentationModel::new(4).with_min_batch_size(2));
        assert_eq!(model.min_batch_size(), 2);
        assert_eq!(model.device(), Device::Cpu);

        let scores = model.forward(Array4::<f32>::zeros((2, 3, 5, 7)).view())?;
        assert_eq!(scores.shape(), &[2, 4, 5, 7]);
        Ok(())
    }

    #[test]
    fn device_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda { device_id: 1 }.to_string(), "cuda:1");
    }
}
