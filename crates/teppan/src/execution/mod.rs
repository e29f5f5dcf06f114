//! # Execution
//!
//! One [`ModelInstance`] runs one execution cycle at a time. A cycle takes
//! ownership of a batch of requests, fuses their inputs, calls the model
//! once and splits the results back into one response per request:
//!
//! ```text
//! Accumulating -> Marshalling -> Invoking -> Disaggregating -> Finalizing -> Done
//!       \______________\______________\____________\_____________> Aborted
//! ```
//!
//! Whatever state a cycle stops in, finalizing always runs: every response
//! still open is sent, every request is released and statistics are
//! reported once per request and once for the cycle.
mod accumulator;
mod disaggregate;
mod ledger;
mod marshal;

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

pub use accumulator::{Accumulation, BatchPlan, CycleAbort, accumulate};
pub use ledger::ResponseLedger;

use crate::backend::RuntimeTensor;
use crate::communication::InferenceRequest;
use crate::config::ModelConfig;
use crate::error::{Result, ServingError};
use crate::frontend::{CycleTiming, Frontend};
use crate::memory::{Device, MemoryManager};
use crate::model::{Model, ModelLoader, invoke, resolve_model_path};
use crate::schema::SchemaIndex;
use disaggregate::OutputDisaggregator;
use marshal::InputMarshaller;

/// Where an execution cycle is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    Accumulating,
    Marshalling,
    Invoking,
    Disaggregating,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Accumulating => "accumulating",
            CycleState::Marshalling => "marshalling",
            CycleState::Invoking => "invoking",
            CycleState::Disaggregating => "disaggregating",
            CycleState::Finalizing => "finalizing",
            CycleState::Done => "done",
            CycleState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A loaded model bound to a device, ready to execute cycles.
///
/// The schema index is built once when the instance is created; an instance
/// whose configuration fails validation is never created.
pub struct ModelInstance<M, T> {
    config: ModelConfig,
    schema: Arc<SchemaIndex>,
    device: Device,
    memory: Arc<dyn MemoryManager>,
    model: M,
    _tensor: PhantomData<fn() -> T>,
}

impl<M, T> ModelInstance<M, T>
where
    M: Model<T>,
    T: RuntimeTensor,
{
    pub fn new(config: ModelConfig, model: M, memory: Arc<dyn MemoryManager>) -> Result<Self> {
        let schema = SchemaIndex::build_for(&config, T::supports).map_err(|err| {
            error!(model = %config.name, error = %err, "invalid model configuration");
            ServingError::from(err)
        })?;
        let device = config.device();
        info!(
            model = %config.name,
            ?device,
            inputs = schema.input_arity(),
            outputs = schema.outputs().len(),
            max_batch_size = config.max_batch_size,
            "created model instance"
        );
        Ok(Self {
            config,
            schema: Arc::new(schema),
            device,
            memory,
            model,
            _tensor: PhantomData,
        })
    }

    /// Load version `version` of the model from `repository` with `loader`.
    pub fn load<L>(
        config: ModelConfig,
        repository: &Path,
        version: u64,
        loader: &L,
        memory: Arc<dyn MemoryManager>,
    ) -> Result<Self>
    where
        L: ModelLoader<T, Model = M>,
    {
        let path = resolve_model_path(
            repository,
            version,
            config.default_model_filename.as_deref(),
        )?;
        let model = loader.load(&path, config.device())?;
        Self::new(config, model, memory)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<SchemaIndex> {
        &self.schema
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Run one execution cycle over `requests`.
    ///
    /// `None` stands for a null request handle and fails the whole cycle.
    /// Every request is released to `frontend` before this returns.
    pub async fn execute<F>(&self, requests: Vec<Option<InferenceRequest>>, frontend: &F) -> CycleState
    where
        F: Frontend + ?Sized,
    {
        let mut timing = CycleTiming::start();
        let mut state = CycleState::Accumulating;
        debug!(model = self.name(), requests = requests.len(), %state, "executing cycle");

        let (total, accumulated) = match accumulate(&requests, self.max_batch_size()) {
            Ok(Accumulation::Empty) => {
                debug!(model = self.name(), "no rows to compute");
                requests
                    .into_iter()
                    .flatten()
                    .for_each(|request| frontend.release_request(request));
                return CycleState::Done;
            }
            Ok(Accumulation::Ready(plan)) => (plan.total, Ok(plan)),
            Err(abort) => {
                let total = match abort {
                    CycleAbort::Overflow { total, .. } => total,
                    _ => 0,
                };
                (total, Err(abort.into_error(self.name())))
            }
        };

        let mut ledger = ResponseLedger::open(frontend, &requests);
        let outcome = match accumulated {
            Ok(plan) => {
                self.run(&requests, &plan, &mut ledger, &mut timing, &mut state)
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            error!(model = self.name(), %state, error = %err, "execution cycle aborted");
            ledger.fail_all(&err);
            state = CycleState::Aborted;
        }

        let terminal = state;
        state = CycleState::Finalizing;
        debug!(model = self.name(), %state, "finalizing cycle");
        timing.mark_exec_end();
        let successes = ledger.finish();
        for (request, success) in requests.into_iter().zip(successes) {
            let Some(request) = request else {
                continue;
            };
            if let Err(err) = frontend.report_request_statistics(&request, success, &timing) {
                warn!(error = %err, "failed reporting request statistics");
            }
            frontend.release_request(request);
        }
        if let Err(err) = frontend.report_batch_statistics(total, &timing) {
            warn!(error = %err, "failed reporting batch statistics");
        }

        let state = if terminal == CycleState::Aborted {
            CycleState::Aborted
        } else {
            CycleState::Done
        };
        debug!(model = self.name(), total, %state, compute_ns = timing.compute_ns(), "cycle complete");
        state
    }

    async fn run<F>(
        &self,
        requests: &[Option<InferenceRequest>],
        plan: &BatchPlan,
        ledger: &mut ResponseLedger<'_, F>,
        timing: &mut CycleTiming,
        state: &mut CycleState,
    ) -> Result<()>
    where
        F: Frontend + ?Sized,
    {
        let batching = self.config.batching_enabled();

        *state = CycleState::Marshalling;
        debug!(model = self.name(), %state, total = plan.total);
        let inputs: Vec<T> = InputMarshaller {
            model: self.name(),
            schema: &self.schema,
            device: self.device,
            memory: self.memory.as_ref(),
            batching,
        }
        .marshal(requests, plan, ledger)
        .await?;

        *state = CycleState::Invoking;
        debug!(model = self.name(), %state, inputs = inputs.len());
        timing.mark_compute_start();
        let outputs = invoke(&self.model, inputs).await;
        timing.mark_compute_end();
        let outputs = outputs?;

        *state = CycleState::Disaggregating;
        debug!(model = self.name(), %state, outputs = outputs.len());
        OutputDisaggregator {
            schema: &self.schema,
            device: self.device,
            memory: self.memory.as_ref(),
            batching,
        }
        .scatter(outputs, plan, ledger)
        .await
    }
}
