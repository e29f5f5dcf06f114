//! Model configuration.
//!
//! The configuration is the JSON rendering of a serving model config. Only the
//! fields the execution core reads are modelled; unknown fields are ignored.
//!
//! ```json
//! {
//!   "name": "resnet",
//!   "max_batch_size": 8,
//!   "input": [{ "name": "INPUT__0", "data_type": "TYPE_FP32", "dims": [3, 224, 224] }],
//!   "output": [{ "name": "OUTPUT__0", "data_type": "TYPE_FP32", "dims": [1000] }],
//!   "instance_group": [{ "kind": "KIND_GPU", "gpus": [0] }]
//! }
//! ```
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServingError};
use crate::memory::Device;

/// A declared model input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorConfig {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub dims: Vec<i64>,
}

/// Sequence control kinds a control input may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    #[serde(rename = "CONTROL_SEQUENCE_START")]
    SequenceStart,
    #[serde(rename = "CONTROL_SEQUENCE_END")]
    SequenceEnd,
    #[serde(rename = "CONTROL_SEQUENCE_READY")]
    SequenceReady,
    #[serde(rename = "CONTROL_SEQUENCE_CORRID")]
    SequenceCorrid,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::SequenceStart => "CONTROL_SEQUENCE_START",
            ControlKind::SequenceEnd => "CONTROL_SEQUENCE_END",
            ControlKind::SequenceReady => "CONTROL_SEQUENCE_READY",
            ControlKind::SequenceCorrid => "CONTROL_SEQUENCE_CORRID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub kind: ControlKind,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub int32_false_true: Vec<i32>,
    #[serde(default)]
    pub fp32_false_true: Vec<f32>,
    #[serde(default)]
    pub bool_false_true: Vec<bool>,
}

/// A pseudo-input the sequence batcher fills in on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    pub name: String,
    #[serde(default)]
    pub control: Vec<Control>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceBatching {
    #[serde(default)]
    pub control_input: Vec<ControlInput>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    #[default]
    #[serde(rename = "KIND_CPU")]
    Cpu,
    #[serde(rename = "KIND_GPU")]
    Gpu,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    #[serde(default)]
    pub kind: InstanceKind,
    #[serde(default)]
    pub gpus: Vec<u32>,
}

/// Configuration of a single model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,

    /// Largest total batch a cycle may carry. `0` disables batching, in which
    /// case every cycle must carry exactly one request.
    #[serde(default)]
    pub max_batch_size: usize,

    /// Artifact file name inside the version directory; `model.pt` if unset.
    #[serde(default)]
    pub default_model_filename: Option<String>,

    #[serde(default)]
    pub input: Vec<TensorConfig>,

    #[serde(default)]
    pub output: Vec<TensorConfig>,

    #[serde(default)]
    pub sequence_batching: Option<SequenceBatching>,

    #[serde(default)]
    pub instance_group: Vec<InstanceGroup>,
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            ServingError::invalid_argument(format!("failed to parse model configuration: {}", e))
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServingError::unavailable(format!(
                "unable to read model configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    pub fn batching_enabled(&self) -> bool {
        self.max_batch_size > 0
    }

    /// The device the first instance group places this model on.
    pub fn device(&self) -> Device {
        match self.instance_group.first() {
            Some(InstanceGroup { kind: InstanceKind::Gpu, gpus }) => Device::Accelerator {
                id: gpus.first().copied().unwrap_or(0),
            },
            _ => Device::Cpu,
        }
    }
}
