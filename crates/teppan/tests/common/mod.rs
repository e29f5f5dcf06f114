#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use teppan::error::Result;
use teppan::prelude::*;

/// Records everything a cycle does to its requests.
#[derive(Default)]
pub struct RecordingFrontend {
    refuse: HashSet<Uuid>,
    outcomes: Mutex<HashMap<Uuid, std::result::Result<InferenceResponse, ServingError>>>,
    sends: AtomicUsize,
    released: Mutex<Vec<Uuid>>,
    statistics: Mutex<Vec<(Uuid, bool)>>,
    batches: Mutex<Vec<usize>>,
}

impl RecordingFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail response creation for `request`.
    pub fn refusing(request: &InferenceRequest) -> Self {
        Self {
            refuse: HashSet::from([request.id()]),
            ..Self::default()
        }
    }

    pub fn response(&self, request: &InferenceRequest) -> Option<InferenceResponse> {
        match self.outcomes.lock().unwrap().get(&request.id()) {
            Some(Ok(response)) => Some(response.clone()),
            _ => None,
        }
    }

    pub fn error(&self, request: &InferenceRequest) -> Option<ServingError> {
        match self.outcomes.lock().unwrap().get(&request.id()) {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Number of send calls, successful or error.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<Uuid> {
        self.released.lock().unwrap().clone()
    }

    pub fn statistics(&self) -> Vec<(Uuid, bool)> {
        self.statistics.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    fn record(&self, request: Uuid, outcome: std::result::Result<InferenceResponse, ServingError>) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let previous = self.outcomes.lock().unwrap().insert(request, outcome);
        assert!(previous.is_none(), "request {} got a second outcome", request);
        Ok(())
    }
}

impl Frontend for RecordingFrontend {
    fn create_response(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        if self.refuse.contains(&request.id()) {
            return Err(ServingError::unavailable("response pool exhausted"));
        }
        Ok(InferenceResponse::new(request.id()))
    }

    fn send_response(&self, response: InferenceResponse) -> Result<()> {
        self.record(response.request_id(), Ok(response))
    }

    fn send_error(&self, response: InferenceResponse, error: ServingError) -> Result<()> {
        self.record(response.request_id(), Err(error))
    }

    fn release_request(&self, request: InferenceRequest) {
        self.released.lock().unwrap().push(request.id());
    }

    fn report_request_statistics(&self, request: &InferenceRequest, success: bool, timing: &CycleTiming) -> Result<()> {
        assert!(timing.exec_start_ns <= timing.exec_end_ns);
        self.statistics.lock().unwrap().push((request.id(), success));
        Ok(())
    }

    fn report_batch_statistics(&self, total_batch_size: usize, _timing: &CycleTiming) -> Result<()> {
        self.batches.lock().unwrap().push(total_batch_size);
        Ok(())
    }
}

/// Returns its inputs unchanged, in order, and remembers what it saw.
#[derive(Default)]
pub struct Echo {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<HostTensor>>,
}

#[async_trait]
impl Model<HostTensor> for Echo {
    async fn forward(&self, inputs: Vec<HostTensor>) -> std::result::Result<ModelOutput<HostTensor>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = inputs.clone();
        Ok(ModelOutput::Multiple(inputs))
    }
}

/// Multiplies its first `FP32` input by `factor`.
pub struct Scale {
    pub factor: f32,
}

#[async_trait]
impl Model<HostTensor> for Scale {
    async fn forward(&self, inputs: Vec<HostTensor>) -> std::result::Result<ModelOutput<HostTensor>, ModelError> {
        let input = inputs
            .first()
            .ok_or_else(|| ModelError::Forward("no inputs".to_string()))?;
        let scaled: Vec<f32> = input.to_vec::<f32>().iter().map(|v| v * self.factor).collect();
        HostTensor::from_elements(&scaled, input.shape())
            .map(|tensor| ModelOutput::Single(tensor.on_device(input.device())))
            .map_err(|err| ModelError::Forward(err.to_string()))
    }
}

/// Returns its first input widened to `FP64`.
pub struct Widen;

#[async_trait]
impl Model<HostTensor> for Widen {
    async fn forward(&self, inputs: Vec<HostTensor>) -> std::result::Result<ModelOutput<HostTensor>, ModelError> {
        let input = &inputs[0];
        let widened: Vec<f64> = input.to_vec::<f32>().iter().map(|v| f64::from(*v)).collect();
        HostTensor::from_elements(&widened, input.shape())
            .map(ModelOutput::Single)
            .map_err(|err| ModelError::Forward(err.to_string()))
    }
}

/// Always fails its forward pass.
#[derive(Default)]
pub struct Broken {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Model<HostTensor> for Broken {
    async fn forward(&self, _inputs: Vec<HostTensor>) -> std::result::Result<ModelOutput<HostTensor>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::Forward("CUDA out of memory".to_string()))
    }
}

/// A configuration with one `FP32` input and one `FP32` output of width 2.
pub fn config(max_batch_size: usize) -> ModelConfig {
    ModelConfig::from_json_str(&format!(
        r#"{{
            "name": "pairs",
            "max_batch_size": {},
            "input": [{{ "name": "INPUT__0", "data_type": "TYPE_FP32", "dims": [2] }}],
            "output": [{{ "name": "OUTPUT__0", "data_type": "TYPE_FP32", "dims": [2] }}]
        }}"#,
        max_batch_size
    ))
    .unwrap()
}

/// A request of `rows` pairs counting up from `start`.
pub fn pairs(rows: usize, start: f32) -> InferenceRequest {
    let values: Vec<f32> = (0..rows * 2).map(|v| start + v as f32).collect();
    InferenceRequest::new().with_input(RequestInput::from_elements("INPUT__0", vec![rows, 2], &values))
}

/// Host memory whose copies all fail, as if the device stream were lost.
#[derive(Default)]
pub struct LostStream {
    pub inner: HostMemoryManager,
}

#[async_trait]
impl MemoryManager for LostStream {
    fn allocate(
        &self,
        byte_size: usize,
        allocation: teppan::memory::AllocationType,
        memory_type_id: i64,
    ) -> Result<teppan::memory::DeviceBuffer> {
        self.inner.allocate(byte_size, allocation, memory_type_id)
    }

    fn copy(
        &self,
        _src: &[u8],
        _src_memory: teppan::memory::MemoryType,
        _dst: &mut [u8],
        _dst_memory: teppan::memory::MemoryType,
        _memory_type_id: i64,
    ) -> Result<teppan::memory::CopyStatus> {
        Err(ServingError::internal("device stream lost"))
    }

    async fn synchronize(&self, memory_type_id: i64) -> Result<()> {
        self.inner.synchronize(memory_type_id).await
    }
}

/// Returns its first input unchanged, plus the same values widened to `FP64`.
pub struct EchoAndWiden;

#[async_trait]
impl Model<HostTensor> for EchoAndWiden {
    async fn forward(&self, inputs: Vec<HostTensor>) -> std::result::Result<ModelOutput<HostTensor>, ModelError> {
        let input = inputs
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Forward("no inputs".to_string()))?;
        let widened: Vec<f64> = input.to_vec::<f32>().iter().map(|v| f64::from(*v)).collect();
        let widened = HostTensor::from_elements(&widened, input.shape())
            .map_err(|err| ModelError::Forward(err.to_string()))?
            .on_device(input.device());
        Ok(ModelOutput::Multiple(vec![input, widened]))
    }
}
