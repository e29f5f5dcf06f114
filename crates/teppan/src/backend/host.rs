use std::borrow::Cow;
use std::fmt;

use bytemuck::Pod;

use super::RuntimeTensor;
use crate::dtype::{DataType, Element, byte_size_for};
use crate::error::{Result, ServingError};
use crate::memory::{Device, DeviceBuffer};

/// A dense, row-major tensor held in host memory.
///
/// `device` records where the runtime would place the tensor; the bytes are
/// always host addressable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostTensor {
    data: Vec<u8>,
    data_type: DataType,
    shape: Vec<usize>,
    device: Device,
}

impl HostTensor {
    pub fn new(data: Vec<u8>, data_type: DataType, shape: Vec<usize>) -> Result<Self> {
        let expected = byte_size_for(data_type, &shape).ok_or_else(|| {
            ServingError::unsupported(format!("{} tensors have no fixed byte size", data_type))
        })?;
        if expected != data.len() {
            return Err(ServingError::invalid_argument(format!(
                "{} bytes given for a {} tensor of shape {:?} ({} bytes)",
                data.len(),
                data_type,
                shape,
                expected
            )));
        }
        Ok(Self {
            data,
            data_type,
            shape,
            device: Device::Cpu,
        })
    }

    /// Build a tensor from typed values, e.g. `&[f32]` for `DataType::Fp32`.
    pub fn from_slice<P: Pod>(values: &[P], data_type: DataType, shape: Vec<usize>) -> Result<Self> {
        Self::new(bytemuck::cast_slice(values).to_vec(), data_type, shape)
    }

    /// Build a tensor whose data type follows from the element type.
    pub fn from_elements<E: Element>(values: &[E], shape: Vec<usize>) -> Result<Self> {
        Self::from_slice(values, E::DATA_TYPE, shape)
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Reinterpret the bytes as typed values.
    pub fn to_vec<P: Pod>(&self) -> Vec<P> {
        bytemuck::pod_collect_to_vec(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for HostTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTensor({}, {:?}, {:?})", self.data_type, self.shape, self.device)
    }
}

impl RuntimeTensor for HostTensor {
    fn shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    fn data_type(&self) -> Result<DataType> {
        Ok(self.data_type)
    }

    fn device(&self) -> Device {
        self.device
    }

    fn contiguous_flat(&self) -> Result<Self> {
        let numel = self.shape.iter().product();
        Ok(Self {
            data: self.data.clone(),
            data_type: self.data_type,
            shape: vec![numel],
            device: self.device,
        })
    }

    fn host_bytes(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(&self.data))
    }

    fn from_buffer(
        buffer: DeviceBuffer,
        data_type: DataType,
        shape: &[usize],
        device: Device,
    ) -> Result<Self> {
        Ok(Self::new(buffer.into_vec(), data_type, shape.to_vec())?.on_device(device))
    }
}
