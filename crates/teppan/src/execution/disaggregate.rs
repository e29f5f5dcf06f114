use tracing::debug;

use super::accumulator::BatchPlan;
use super::ledger::ResponseLedger;
use crate::backend::RuntimeTensor;
use crate::dtype::byte_size_for;
use crate::error::{Result, ServingError};
use crate::frontend::Frontend;
use crate::memory::{CopyBarrier, Device, MemoryManager};
use crate::schema::{OutputEntry, SchemaIndex};

/// Scatters the model's results back into each open response.
pub(crate) struct OutputDisaggregator<'a> {
    pub schema: &'a SchemaIndex,
    pub device: Device,
    pub memory: &'a dyn MemoryManager,
    pub batching: bool,
}

impl OutputDisaggregator<'_> {
    /// Copy each request's rows of every declared output into its response.
    ///
    /// An output index past the results, or a result whose type differs from
    /// the declared one, fails the cycle. A request whose rows fall outside
    /// what the model produced fails alone.
    pub async fn scatter<T, F>(
        &self,
        outputs: Vec<T>,
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
    ) -> Result<()>
    where
        T: RuntimeTensor,
        F: Frontend + ?Sized,
    {
        if self
            .schema
            .max_output_index()
            .is_some_and(|max| max >= outputs.len())
        {
            let missing = self
                .schema
                .outputs()
                .iter()
                .find(|entry| entry.index >= outputs.len())
                .map(|entry| entry.name.as_str())
                .unwrap_or_default();
            return Err(ServingError::invalid_argument(format!(
                "The output {} in the model configuration refers to an output index which \
                 doesn't exist. This model has {} outputs",
                missing,
                outputs.len()
            )));
        }

        // Copies queued before a failing output still complete before the
        // results are dropped.
        let mut barrier = CopyBarrier::new(self.device);
        let scattered = self
            .schema
            .outputs()
            .iter()
            .try_for_each(|entry| self.scatter_one(entry, &outputs[entry.index], plan, ledger, &mut barrier));
        let synchronized = barrier.wait(self.memory).await;
        drop(outputs);
        scattered?;
        synchronized
    }

    fn scatter_one<T, F>(
        &self,
        entry: &OutputEntry,
        tensor: &T,
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
        barrier: &mut CopyBarrier,
    ) -> Result<()>
    where
        T: RuntimeTensor,
        F: Frontend + ?Sized,
    {
        let flat = tensor.contiguous_flat()?;
        let data_type = flat.data_type()?;
        if data_type != entry.data_type {
            return Err(ServingError::invalid_argument(format!(
                "unexpected datatype TYPE_{} for inference output '{}', expecting TYPE_{}",
                data_type, entry.name, entry.data_type
            )));
        }

        let shape = tensor.shape();
        let bytes = flat.host_bytes()?;
        let src_memory = tensor.device().memory_type();
        let row_bytes = if self.batching {
            if shape.is_empty() {
                return Err(ServingError::invalid_argument(format!(
                    "output '{}' has no batch dimension",
                    entry.name
                )));
            }
            byte_size_for(data_type, &shape[1..]).unwrap_or(0)
        } else {
            bytes.len()
        };
        debug!(output = %entry.name, index = entry.index, ?shape, "scattering output");

        for i in 0..ledger.len() {
            let (start, len, request_shape) = if self.batching {
                let rows = plan.rows[i];
                let request_shape: Vec<usize> =
                    std::iter::once(rows).chain(shape[1..].iter().copied()).collect();
                (plan.offset(i) * row_bytes, rows * row_bytes, request_shape)
            } else {
                (0, bytes.len(), shape.clone())
            };

            let result = match ledger.response_mut(i) {
                None => continue,
                Some(_) if start + len > bytes.len() => Err(ServingError::internal(format!(
                    "output '{}' holds {} bytes, rows of request {} end at byte {}",
                    entry.name,
                    bytes.len(),
                    i,
                    start + len
                ))),
                Some(response) => response
                    .add_output(&entry.name, data_type, request_shape)
                    .and_then(|output| {
                        let dst_memory = output.memory_type();
                        self.device.copy(
                            self.memory,
                            &bytes[start..start + len],
                            src_memory,
                            output.buffer_mut().as_mut_slice(),
                            dst_memory,
                            barrier,
                        )
                    }),
            };
            if let Err(err) = result {
                ledger.fail(i, err);
            }
        }
        Ok(())
    }
}
