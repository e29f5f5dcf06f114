use crate::communication::InferenceRequest;
use crate::error::ServingError;

/// How a cycle's rows are split across its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Leading dimension of every aggregated tensor.
    pub total: usize,
    /// Rows contributed by each request, in request order.
    pub rows: Vec<usize>,
}

impl BatchPlan {
    /// Row offset of request `index` within the aggregated tensors.
    pub fn offset(&self, index: usize) -> usize {
        self.rows[..index].iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulation {
    /// No rows to compute; the cycle ends without touching any response.
    Empty,
    Ready(BatchPlan),
}

/// A condition that fails every request before any work is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAbort {
    /// Every other request of the cycle fails with this error too.
    NullRequest { index: usize },
    MissingBatchInput { index: usize },
    Overflow { total: usize, max: usize },
}

impl CycleAbort {
    pub fn into_error(self, model: &str) -> ServingError {
        match self {
            CycleAbort::NullRequest { .. } => {
                ServingError::internal(format!("null request given to model '{}'", model))
            }
            CycleAbort::MissingBatchInput { index } => ServingError::invalid_argument(format!(
                "request {} for '{}' has no input to read a batch size from",
                index, model
            )),
            CycleAbort::Overflow { total, max } => ServingError::invalid_argument(format!(
                "batch size {} for '{}', max allowed is {}",
                total, model, max
            )),
        }
    }
}

/// Sum the rows a cycle covers and check them against `max_batch_size`.
///
/// With batching enabled each request contributes the leading dimension of
/// its first input; otherwise each request is one row. A lone row is always
/// accepted, even when batching is disabled.
pub fn accumulate(
    requests: &[Option<InferenceRequest>],
    max_batch_size: usize,
) -> Result<Accumulation, CycleAbort> {
    let mut rows = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        let request = request.as_ref().ok_or(CycleAbort::NullRequest { index })?;
        if max_batch_size > 0 {
            let batch = request
                .batch_size()
                .ok_or(CycleAbort::MissingBatchInput { index })?;
            rows.push(batch);
        } else {
            rows.push(1);
        }
    }

    let total: usize = rows.iter().sum();
    if total == 0 {
        return Ok(Accumulation::Empty);
    }
    if total != 1 && total > max_batch_size {
        return Err(CycleAbort::Overflow {
            total,
            max: max_batch_size,
        });
    }
    Ok(Accumulation::Ready(BatchPlan { total, rows }))
}
