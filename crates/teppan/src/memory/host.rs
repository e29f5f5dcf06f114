use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{AllocationType, CopyStatus, DeviceBuffer, MemoryManager, MemoryType};
use crate::error::{Result, ServingError};

/// Heap backed [`MemoryManager`].
///
/// Accelerator memory is emulated in host memory. Copies that touch it are
/// reported as queued so callers exercise the same synchronization path they
/// would on a real device stream.
#[derive(Debug, Default)]
pub struct HostMemoryManager {
    /// Largest allocation the accelerator pool will serve.
    pool_limit: Option<usize>,
    pooled: AtomicUsize,
    synchronizations: AtomicUsize,
}

impl HostMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_limit(limit: usize) -> Self {
        Self {
            pool_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Number of allocations served from the accelerator pool.
    pub fn pooled_allocations(&self) -> usize {
        self.pooled.load(Ordering::SeqCst)
    }

    pub fn synchronizations(&self) -> usize {
        self.synchronizations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryManager for HostMemoryManager {
    fn allocate(
        &self,
        byte_size: usize,
        allocation: AllocationType,
        memory_type_id: i64,
    ) -> Result<DeviceBuffer> {
        if allocation == AllocationType::GpuPool {
            if let Some(limit) = self.pool_limit {
                if byte_size > limit {
                    return Err(ServingError::unavailable(format!(
                        "pool cannot serve {} bytes (limit {})",
                        byte_size, limit
                    )));
                }
            }
            self.pooled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(DeviceBuffer::zeroed(byte_size, allocation.memory_type(), memory_type_id))
    }

    fn copy(
        &self,
        src: &[u8],
        src_memory: MemoryType,
        dst: &mut [u8],
        dst_memory: MemoryType,
        _memory_type_id: i64,
    ) -> Result<CopyStatus> {
        if src.len() != dst.len() {
            return Err(ServingError::internal("copy between buffers of different size"));
        }
        dst.copy_from_slice(src);
        if src_memory.is_device() || dst_memory.is_device() {
            Ok(CopyStatus::Queued)
        } else {
            Ok(CopyStatus::Complete)
        }
    }

    async fn synchronize(&self, _memory_type_id: i64) -> Result<()> {
        self.synchronizations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
