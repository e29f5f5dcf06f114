use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::communication::{InferenceRequest, InferenceResponse, Outcome};
use crate::error::{Result, ServingError};
use crate::frontend::{CycleTiming, Frontend};

/// Counters a [`ChannelFrontend`] accumulates across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatistics {
    pub success_count: u64,
    pub failure_count: u64,
    pub batch_count: u64,
    /// Rows computed across every batch.
    pub batched_rows: u64,
    pub compute_ns: u64,
}

/// A [`Frontend`] that delivers each request's outcome over the oneshot
/// channel registered for it.
#[derive(Debug, Default)]
pub struct ChannelFrontend {
    senders: Mutex<HashMap<Uuid, oneshot::Sender<Outcome>>>,
    statistics: Mutex<DispatchStatistics>,
}

impl ChannelFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, request: Uuid, sender: oneshot::Sender<Outcome>) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.insert(request, sender);
        }
    }

    pub fn statistics(&self) -> DispatchStatistics {
        self.statistics
            .lock()
            .map(|statistics| *statistics)
            .unwrap_or_default()
    }

    fn deliver(&self, request: Uuid, outcome: Outcome) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .map_err(|_| ServingError::internal("response channels poisoned"))?
            .remove(&request)
            .ok_or_else(|| {
                ServingError::internal(format!("response for request {} already sent", request))
            })?;
        sender
            .send(outcome)
            .map_err(|_| ServingError::unavailable(format!("requester of {} went away", request)))
    }

    fn record(&self, update: impl FnOnce(&mut DispatchStatistics)) -> Result<()> {
        let mut statistics = self
            .statistics
            .lock()
            .map_err(|_| ServingError::internal("statistics poisoned"))?;
        update(&mut statistics);
        Ok(())
    }
}

impl Frontend for ChannelFrontend {
    fn create_response(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let registered = self
            .senders
            .lock()
            .map(|senders| senders.contains_key(&request.id()))
            .unwrap_or(false);
        if !registered {
            return Err(ServingError::unavailable(format!(
                "no response channel for request {}",
                request.id()
            )));
        }
        Ok(InferenceResponse::new(request.id()))
    }

    fn send_response(&self, response: InferenceResponse) -> Result<()> {
        let request = response.request_id();
        self.deliver(request, Ok(response))
    }

    fn send_error(&self, response: InferenceResponse, error: ServingError) -> Result<()> {
        self.deliver(response.request_id(), Err(error))
    }

    fn release_request(&self, request: InferenceRequest) {
        // A request released without an outcome still resolves its handle.
        let unsent = self
            .senders
            .lock()
            .ok()
            .and_then(|mut senders| senders.remove(&request.id()));
        if unsent.is_some() {
            warn!(request = %request.id(), "request released without an outcome");
        }
        trace!(request = %request.id(), "released request");
    }

    fn report_request_statistics(
        &self,
        _request: &InferenceRequest,
        success: bool,
        _timing: &CycleTiming,
    ) -> Result<()> {
        self.record(|statistics| {
            if success {
                statistics.success_count += 1;
            } else {
                statistics.failure_count += 1;
            }
        })
    }

    fn report_batch_statistics(&self, total_batch_size: usize, timing: &CycleTiming) -> Result<()> {
        self.record(|statistics| {
            statistics.batch_count += 1;
            statistics.batched_rows += total_batch_size as u64;
            statistics.compute_ns += timing.compute_ns();
        })
    }
}
