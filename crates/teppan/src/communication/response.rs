use uuid::Uuid;

use crate::dtype::{DataType, byte_size_for};
use crate::error::{Result, ServingError};
use crate::memory::{DeviceBuffer, MemoryType};

/// A named output tensor of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutput {
    name: String,
    data_type: DataType,
    shape: Vec<usize>,
    data: DeviceBuffer,
}

impl ResponseOutput {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn memory_type(&self) -> MemoryType {
        self.data.memory_type()
    }

    /// Reinterpret the output bytes as typed values.
    pub fn values<P: bytemuck::Pod>(&self) -> Vec<P> {
        bytemuck::pod_collect_to_vec(self.data.as_slice())
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut DeviceBuffer {
        &mut self.data
    }
}

/// The write-once destination for a request's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    request_id: Uuid,
    outputs: Vec<ResponseOutput>,
}

impl InferenceResponse {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            outputs: vec![],
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn outputs(&self) -> &[ResponseOutput] {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&ResponseOutput> {
        self.outputs.iter().find(|output| output.name == name)
    }

    /// Add a host resident output of `data_type` and `shape` and return it
    /// for filling.
    pub fn add_output(
        &mut self,
        name: &str,
        data_type: DataType,
        shape: Vec<usize>,
    ) -> Result<&mut ResponseOutput> {
        if self.output(name).is_some() {
            return Err(ServingError::internal(format!(
                "output '{}' already added to response",
                name
            )));
        }
        let byte_size = byte_size_for(data_type, &shape).ok_or_else(|| {
            ServingError::unsupported(format!("output '{}' has no fixed byte size", name))
        })?;
        self.outputs.push(ResponseOutput {
            name: name.to_string(),
            data_type,
            shape,
            data: DeviceBuffer::zeroed(byte_size, MemoryType::Cpu, 0),
        });
        let last = self.outputs.len() - 1;
        Ok(&mut self.outputs[last])
    }
}
