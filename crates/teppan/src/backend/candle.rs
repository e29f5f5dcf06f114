use std::borrow::Cow;

use candle_core::{DType, DeviceLocation, Tensor};

use super::RuntimeTensor;
use crate::dtype::DataType;
use crate::error::{Result, ServingError};
use crate::memory::{Device, DeviceBuffer};

fn runtime_error(err: candle_core::Error) -> ServingError {
    ServingError::internal(err.to_string())
}

fn to_candle_dtype(data_type: DataType) -> Result<DType> {
    match data_type {
        DataType::Uint8 => Ok(DType::U8),
        DataType::Int64 => Ok(DType::I64),
        DataType::Fp16 => Ok(DType::F16),
        DataType::Bf16 => Ok(DType::BF16),
        DataType::Fp32 => Ok(DType::F32),
        DataType::Fp64 => Ok(DType::F64),
        other => Err(ServingError::unsupported(format!(
            "candle has no tensor type for {}",
            other
        ))),
    }
}

fn to_candle_device(device: Device) -> Result<candle_core::Device> {
    match device {
        Device::Cpu => Ok(candle_core::Device::Cpu),
        Device::Accelerator { id } => candle_core::Device::new_cuda(id as usize)
            .map_err(|e| ServingError::unavailable(format!("accelerator {} unavailable: {}", id, e))),
    }
}

fn pod_bytes<T>(tensor: &Tensor) -> Result<Vec<u8>>
where
    T: candle_core::WithDType + bytemuck::Pod,
{
    let values = tensor.to_vec1::<T>().map_err(runtime_error)?;
    Ok(bytemuck::cast_slice(&values).to_vec())
}

impl RuntimeTensor for Tensor {
    fn shape(&self) -> Vec<usize> {
        self.dims().to_vec()
    }

    fn data_type(&self) -> Result<DataType> {
        match self.dtype() {
            DType::U8 => Ok(DataType::Uint8),
            DType::U32 => Ok(DataType::Uint32),
            DType::I64 => Ok(DataType::Int64),
            DType::F16 => Ok(DataType::Fp16),
            DType::BF16 => Ok(DataType::Bf16),
            DType::F32 => Ok(DataType::Fp32),
            DType::F64 => Ok(DataType::Fp64),
            #[allow(unreachable_patterns)]
            other => Err(ServingError::unsupported(format!(
                "candle tensor type {:?} has no serving equivalent",
                other
            ))),
        }
    }

    fn device(&self) -> Device {
        match Tensor::device(self).location() {
            DeviceLocation::Cpu => Device::Cpu,
            DeviceLocation::Cuda { gpu_id } | DeviceLocation::Metal { gpu_id } => {
                Device::Accelerator { id: gpu_id as u32 }
            }
        }
    }

    fn contiguous_flat(&self) -> Result<Self> {
        self.contiguous()
            .and_then(|t| t.flatten_all())
            .map_err(runtime_error)
    }

    fn host_bytes(&self) -> Result<Cow<'_, [u8]>> {
        let flat = self.contiguous_flat()?;
        let bytes = match flat.dtype() {
            DType::U8 => pod_bytes::<u8>(&flat)?,
            DType::U32 => pod_bytes::<u32>(&flat)?,
            DType::I64 => pod_bytes::<i64>(&flat)?,
            DType::F16 => pod_bytes::<half::f16>(&flat)?,
            DType::BF16 => pod_bytes::<half::bf16>(&flat)?,
            DType::F32 => pod_bytes::<f32>(&flat)?,
            DType::F64 => pod_bytes::<f64>(&flat)?,
            #[allow(unreachable_patterns)]
            other => {
                return Err(ServingError::unsupported(format!(
                    "cannot read candle tensor of type {:?}",
                    other
                )));
            }
        };
        Ok(Cow::Owned(bytes))
    }

    fn supports(data_type: DataType) -> bool {
        to_candle_dtype(data_type).is_ok()
    }

    fn from_buffer(
        buffer: DeviceBuffer,
        data_type: DataType,
        shape: &[usize],
        device: Device,
    ) -> Result<Self> {
        let dtype = to_candle_dtype(data_type)?;
        let device = to_candle_device(device)?;
        Tensor::from_raw_buffer(buffer.as_slice(), dtype, shape, &device).map_err(runtime_error)
    }
}
