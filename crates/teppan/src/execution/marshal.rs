use tracing::debug;

use super::accumulator::BatchPlan;
use super::ledger::ResponseLedger;
use crate::backend::RuntimeTensor;
use crate::communication::{InferenceRequest, RequestInput};
use crate::dtype::{DataType, byte_size_for};
use crate::error::{Result, ServingError};
use crate::frontend::Frontend;
use crate::memory::{CopyBarrier, Device, DeviceBuffer, MemoryManager};
use crate::schema::SchemaIndex;

/// Gathers the inputs of every request into one buffer per model input.
pub(crate) struct InputMarshaller<'a> {
    pub model: &'a str,
    pub schema: &'a SchemaIndex,
    pub device: Device,
    pub memory: &'a dyn MemoryManager,
    pub batching: bool,
}

struct Staged {
    index: usize,
    buffer: DeviceBuffer,
    data_type: DataType,
    shape: Vec<usize>,
    row_bytes: usize,
}

impl InputMarshaller<'_> {
    /// Build the model's positional arguments for one cycle.
    ///
    /// Per-request problems fail only that request; its rows stay zeroed.
    /// Allocation and copy failures fail the whole cycle.
    pub async fn marshal<T, F>(
        &self,
        requests: &[Option<InferenceRequest>],
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
    ) -> Result<Vec<T>>
    where
        T: RuntimeTensor,
        F: Frontend + ?Sized,
    {
        let representative = requests
            .first()
            .and_then(Option::as_ref)
            .ok_or_else(|| ServingError::internal("no request to read model inputs from"))?;

        // Buffers are held until the barrier even when gathering fails part way.
        let mut barrier = CopyBarrier::new(self.device);
        let mut staged: Vec<Staged> = Vec::with_capacity(representative.inputs().len());
        let gathered = self.gather_all(representative, requests, plan, ledger, &mut barrier, &mut staged);
        let synchronized = barrier.wait(self.memory).await;
        gathered?;
        synchronized?;

        let mut slots: Vec<Option<T>> = (0..self.schema.input_arity()).map(|_| None).collect();
        for Staged {
            index,
            buffer,
            data_type,
            shape,
            ..
        } in staged
        {
            slots[index] = Some(T::from_buffer(buffer, data_type, &shape, self.device)?);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    let name = self
                        .schema
                        .inputs()
                        .find(|(_, i)| *i == index)
                        .map(|(name, _)| name.to_string())
                        .unwrap_or_else(|| format!("#{}", index));
                    ServingError::internal(format!(
                        "model '{}' expects input '{}' which no request provides",
                        self.model, name
                    ))
                })
            })
            .collect()
    }

    fn gather_all<F: Frontend + ?Sized>(
        &self,
        representative: &InferenceRequest,
        requests: &[Option<InferenceRequest>],
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
        barrier: &mut CopyBarrier,
        staged: &mut Vec<Staged>,
    ) -> Result<()> {
        for input in representative.inputs() {
            let index = self.schema.input_index(input.name()).ok_or_else(|| {
                ServingError::invalid_argument(format!(
                    "unexpected inference input '{}' for model '{}'",
                    input.name(),
                    self.model
                ))
            })?;
            if staged.iter().any(|s| s.index == index) {
                return Err(ServingError::invalid_argument(format!(
                    "input '{}' given more than once for model '{}'",
                    input.name(),
                    self.model
                )));
            }
            staged.push(self.allocate(input, index, plan)?);
            if let Some(entry) = staged.last_mut() {
                self.gather(input.name(), entry, requests, plan, ledger, barrier)?;
            }
        }
        Ok(())
    }

    fn allocate(&self, representative: &RequestInput, index: usize, plan: &BatchPlan) -> Result<Staged> {
        let name = representative.name();
        let data_type = representative.data_type();
        let shape = if self.batching {
            let (_, rest) = representative.shape().split_first().ok_or_else(|| {
                ServingError::invalid_argument(format!(
                    "input '{}' has no batch dimension",
                    name
                ))
            })?;
            std::iter::once(plan.total).chain(rest.iter().copied()).collect()
        } else {
            representative.shape().to_vec()
        };
        let byte_size = byte_size_for(data_type, &shape).ok_or_else(|| {
            ServingError::unsupported(format!(
                "input '{}' of type {} has no fixed byte size",
                name, data_type
            ))
        })?;
        let row_bytes = if self.batching {
            byte_size_for(data_type, &shape[1..]).unwrap_or(0)
        } else {
            byte_size
        };

        let buffer = self.device.allocate(self.memory, byte_size)?;
        debug!(input = name, index, byte_size, memory = ?buffer.memory_type(), "gathering input");
        Ok(Staged {
            index,
            buffer,
            data_type,
            shape,
            row_bytes,
        })
    }

    fn gather<F: Frontend + ?Sized>(
        &self,
        name: &str,
        staged: &mut Staged,
        requests: &[Option<InferenceRequest>],
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
        barrier: &mut CopyBarrier,
    ) -> Result<()> {
        let dst_memory = staged.buffer.memory_type();
        // Every request shares all but the batch dimension.
        let shared = if self.batching { &staged.shape[1..] } else { &staged.shape[..] };

        for (i, request) in requests.iter().enumerate() {
            let Some(request) = request else {
                continue;
            };
            let (offset, expected) = if self.batching {
                (plan.offset(i) * staged.row_bytes, plan.rows[i] * staged.row_bytes)
            } else {
                (0, staged.buffer.len())
            };
            let Some(input) = request.input(name) else {
                ledger.fail(
                    i,
                    ServingError::invalid_argument(format!(
                        "request is missing input '{}'",
                        name
                    )),
                );
                continue;
            };
            if input.data_type() != staged.data_type {
                ledger.fail(
                    i,
                    ServingError::invalid_argument(format!(
                        "input '{}' has data type {}, expected {}",
                        name,
                        input.data_type(),
                        staged.data_type
                    )),
                );
                continue;
            }
            let dims = if self.batching {
                input.shape().get(1..).unwrap_or_default()
            } else {
                input.shape()
            };
            if dims != shared {
                ledger.fail(
                    i,
                    ServingError::invalid_argument(format!(
                        "input '{}' has shape {:?} which does not match the batch shape {:?}",
                        name,
                        input.shape(),
                        staged.shape
                    )),
                );
                continue;
            }
            if input.byte_size() != expected || offset + expected > staged.buffer.len() {
                ledger.fail(
                    i,
                    ServingError::invalid_argument(format!(
                        "input '{}' holds {} bytes, expected {}",
                        name,
                        input.byte_size(),
                        expected
                    )),
                );
                continue;
            }

            let mut cursor = offset;
            for source in input.buffers() {
                let end = cursor + source.len();
                self.device.copy(
                    self.memory,
                    source.as_slice(),
                    source.memory_type(),
                    &mut staged.buffer.as_mut_slice()[cursor..end],
                    dst_memory,
                    barrier,
                )?;
                cursor = end;
            }
        }
        Ok(())
    }
}
