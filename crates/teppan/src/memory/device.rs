use tracing::debug;

use super::{AllocationType, CopyStatus, DeviceBuffer, MemoryManager, MemoryType};
use crate::error::{Result, ServingError};

/// The device family a model instance executes on.
///
/// This is the single place that knows how host and accelerator targets
/// differ: which allocation strategies to try and which stream copies go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Accelerator { id: u32 },
}

impl Device {
    /// Allocation strategies in the order they are tried.
    pub fn allocation_preference(&self) -> &'static [AllocationType] {
        match self {
            Device::Cpu => &[AllocationType::Cpu],
            Device::Accelerator { .. } => &[AllocationType::GpuPool, AllocationType::Gpu],
        }
    }

    pub fn memory_type(&self) -> MemoryType {
        match self {
            Device::Cpu => MemoryType::Cpu,
            Device::Accelerator { .. } => MemoryType::Gpu,
        }
    }

    pub fn memory_type_id(&self) -> i64 {
        match self {
            Device::Cpu => 0,
            Device::Accelerator { id } => i64::from(*id),
        }
    }

    /// Allocate a buffer on this device; the first strategy that succeeds wins.
    pub fn allocate(&self, memory: &dyn MemoryManager, byte_size: usize) -> Result<DeviceBuffer> {
        let mut last_error = None;
        for allocation in self.allocation_preference() {
            match memory.allocate(byte_size, *allocation, self.memory_type_id()) {
                Ok(buffer) => return Ok(buffer),
                Err(err) => {
                    debug!(?allocation, byte_size, error = %err, "allocation strategy failed");
                    last_error = Some(err);
                }
            }
        }
        Err(ServingError::internal(format!(
            "failed to allocate {} bytes on {:?}: {}",
            byte_size,
            self,
            last_error.map(|e| e.message().to_string()).unwrap_or_default()
        )))
    }

    /// Issue one copy on this device's stream, recording it on `barrier`.
    pub fn copy(
        &self,
        memory: &dyn MemoryManager,
        src: &[u8],
        src_memory: MemoryType,
        dst: &mut [u8],
        dst_memory: MemoryType,
        barrier: &mut CopyBarrier,
    ) -> Result<()> {
        if src.len() != dst.len() {
            return Err(ServingError::internal(format!(
                "copy size mismatch: {} source bytes for a {} byte destination",
                src.len(),
                dst.len()
            )));
        }
        let status = memory.copy(src, src_memory, dst, dst_memory, self.memory_type_id())?;
        barrier.record(status);
        Ok(())
    }
}

/// Tracks the copies of one phase; [`CopyBarrier::wait`] is a full barrier.
#[derive(Debug)]
pub struct CopyBarrier {
    device: Device,
    pending: bool,
}

impl CopyBarrier {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            pending: false,
        }
    }

    pub fn record(&mut self, status: CopyStatus) {
        self.pending |= status == CopyStatus::Queued;
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Wait for every queued copy of this phase.
    pub async fn wait(self, memory: &dyn MemoryManager) -> Result<()> {
        if self.pending {
            memory.synchronize(self.device.memory_type_id()).await?;
        }
        Ok(())
    }
}
