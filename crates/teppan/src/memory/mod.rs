//! # Memory
//!
//! Buffers for aggregated tensors and the collaborator that owns the
//! low-level allocator.
//!
//! The execution core never allocates device memory itself. It asks a
//! [`MemoryManager`] for a buffer, passing one allocation type at a time in
//! the order of the [`Device`]'s preference list, and moves bytes with the
//! manager's copy primitive. Copies touching device memory may be queued on a
//! device stream; a [`CopyBarrier`] records that and waits for the stream
//! before the buffer is read.

mod device;
mod host;

pub use device::{CopyBarrier, Device};
pub use host::HostMemoryManager;

use async_trait::async_trait;

use crate::error::Result;

/// Where a buffer physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Cpu,
    CpuPinned,
    Gpu,
}

impl MemoryType {
    pub fn is_device(&self) -> bool {
        matches!(self, MemoryType::Gpu)
    }
}

/// Allocation strategies a [`MemoryManager`] may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationType {
    Cpu,
    CpuPinned,
    /// Pooled accelerator memory.
    GpuPool,
    /// Unpooled accelerator memory.
    Gpu,
}

impl AllocationType {
    pub fn memory_type(&self) -> MemoryType {
        match self {
            AllocationType::Cpu => MemoryType::Cpu,
            AllocationType::CpuPinned => MemoryType::CpuPinned,
            AllocationType::GpuPool | AllocationType::Gpu => MemoryType::Gpu,
        }
    }
}

/// Outcome of a single copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    /// The bytes are in place.
    Complete,
    /// The copy was issued on a device stream and is only guaranteed to have
    /// landed after the stream is synchronized.
    Queued,
}

/// A contiguous buffer owned by the execution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBuffer {
    data: Vec<u8>,
    memory_type: MemoryType,
    memory_type_id: i64,
}

impl DeviceBuffer {
    pub fn new(data: Vec<u8>, memory_type: MemoryType, memory_type_id: i64) -> Self {
        Self {
            data,
            memory_type,
            memory_type_id,
        }
    }

    pub fn zeroed(byte_size: usize, memory_type: MemoryType, memory_type_id: i64) -> Self {
        Self::new(vec![0; byte_size], memory_type, memory_type_id)
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn memory_type_id(&self) -> i64 {
        self.memory_type_id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// The host runtime's memory manager.
#[async_trait]
pub trait MemoryManager: Send + Sync {
    /// Allocate `byte_size` bytes using exactly one allocation strategy.
    fn allocate(
        &self,
        byte_size: usize,
        allocation: AllocationType,
        memory_type_id: i64,
    ) -> Result<DeviceBuffer>;

    /// Copy `src` into `dst`; both slices have equal length.
    ///
    /// Copies that involve device memory may be queued on the stream of
    /// `memory_type_id` and report [`CopyStatus::Queued`].
    fn copy(
        &self,
        src: &[u8],
        src_memory: MemoryType,
        dst: &mut [u8],
        dst_memory: MemoryType,
        memory_type_id: i64,
    ) -> Result<CopyStatus>;

    /// Block until every copy queued on the stream of `memory_type_id` landed.
    async fn synchronize(&self, memory_type_id: i64) -> Result<()>;
}
