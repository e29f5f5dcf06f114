use std::borrow::Cow;
use std::fmt::Debug;

use crate::dtype::DataType;
use crate::error::Result;
use crate::memory::{Device, DeviceBuffer};

/// The tensor operations the execution core needs from a tensor runtime.
///
/// Any runtime whose tensors implement this trait can be served: the core
/// wraps aggregated input buffers with [`RuntimeTensor::from_buffer`] and reads
/// model results back through [`RuntimeTensor::host_bytes`].
pub trait RuntimeTensor: Debug + Clone + Send + Sync + 'static {
    /// Return the shape of this tensor
    fn shape(&self) -> Vec<usize>;

    /// The serving data type of this tensor, an error if the runtime type has
    /// no serving equivalent
    fn data_type(&self) -> Result<DataType>;

    /// Device the tensor's storage lives on
    fn device(&self) -> Device;

    /// A row-major contiguous, one dimensional view of this tensor
    fn contiguous_flat(&self) -> Result<Self>;

    /// The tensor's bytes in row-major order
    fn host_bytes(&self) -> Result<Cow<'_, [u8]>>;

    /// Whether tensors of `data_type` can be built by this runtime. Model
    /// configurations declaring any other type are rejected at load time.
    fn supports(data_type: DataType) -> bool {
        data_type.is_model_supported()
    }

    /// Wrap an aggregated buffer as a tensor of `data_type` and `shape` on `device`
    fn from_buffer(
        buffer: DeviceBuffer,
        data_type: DataType,
        shape: &[usize],
        device: Device,
    ) -> Result<Self>;
}
