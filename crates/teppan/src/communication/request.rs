use uuid::Uuid;

use crate::dtype::{DataType, Element};
use crate::memory::{DeviceBuffer, MemoryType};

/// One named input tensor of a request.
///
/// The tensor's bytes may arrive split across several buffers, each in host
/// or device memory; concatenated in order they form the row-major tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInput {
    name: String,
    data_type: DataType,
    shape: Vec<usize>,
    buffers: Vec<DeviceBuffer>,
}

impl RequestInput {
    pub fn new(name: impl Into<String>, data_type: DataType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            data_type,
            shape,
            buffers: vec![],
        }
    }

    /// Append a buffer holding the next bytes of this input.
    pub fn with_buffer(mut self, buffer: DeviceBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Build an input whose bytes sit in a single host buffer.
    pub fn from_host_bytes(
        name: impl Into<String>,
        data_type: DataType,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> Self {
        Self::new(name, data_type, shape).with_buffer(DeviceBuffer::new(data, MemoryType::Cpu, 0))
    }

    /// Build an input from typed values held in host memory.
    pub fn from_values<P: bytemuck::Pod>(
        name: impl Into<String>,
        data_type: DataType,
        shape: Vec<usize>,
        values: &[P],
    ) -> Self {
        Self::from_host_bytes(name, data_type, shape, bytemuck::cast_slice(values).to_vec())
    }

    /// Like [`RequestInput::from_values`] with the data type taken from `E`.
    pub fn from_elements<E: Element>(name: impl Into<String>, shape: Vec<usize>, values: &[E]) -> Self {
        Self::from_values(name, E::DATA_TYPE, shape, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn buffers(&self) -> &[DeviceBuffer] {
        &self.buffers
    }

    /// Total bytes carried across all buffers.
    pub fn byte_size(&self) -> usize {
        self.buffers.iter().map(DeviceBuffer::len).sum()
    }
}

/// A read-only view of one inference request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    id: Uuid,
    inputs: Vec<RequestInput>,
}

impl InferenceRequest {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs: vec![],
        }
    }

    pub fn with_input(mut self, input: RequestInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn inputs(&self) -> &[RequestInput] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&RequestInput> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Leading dimension of the first input, the request's batch size when
    /// the model batches.
    pub fn batch_size(&self) -> Option<usize> {
        self.inputs.first().and_then(|input| input.shape.first().copied())
    }
}

impl Default for InferenceRequest {
    fn default() -> Self {
        Self::new()
    }
}
