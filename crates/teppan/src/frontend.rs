//! The serving front-end as seen from an execution cycle.
//!
//! A front-end owns the request and response lifecycle: it hands requests to
//! a cycle, creates the response objects the cycle writes into, transports
//! whatever the cycle sends, takes requests back on release and collects
//! timing statistics.
use std::time::{SystemTime, UNIX_EPOCH};

use crate::communication::{InferenceRequest, InferenceResponse};
use crate::error::{Result, ServingError};

/// Wall-clock marks of one execution cycle, in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTiming {
    pub exec_start_ns: u64,
    pub compute_start_ns: u64,
    pub compute_end_ns: u64,
    pub exec_end_ns: u64,
}

impl CycleTiming {
    /// Begin timing a cycle at the current instant.
    pub fn start() -> Self {
        Self {
            exec_start_ns: timestamp_ns(),
            ..Self::default()
        }
    }

    pub fn mark_compute_start(&mut self) {
        self.compute_start_ns = timestamp_ns();
    }

    pub fn mark_compute_end(&mut self) {
        self.compute_end_ns = timestamp_ns();
    }

    /// Close the cycle. Compute marks a cycle never reached collapse onto
    /// the end mark so the four marks stay ordered.
    pub fn mark_exec_end(&mut self) {
        self.exec_end_ns = timestamp_ns().max(self.exec_start_ns);
        if self.compute_start_ns == 0 {
            self.compute_start_ns = self.exec_end_ns;
        }
        if self.compute_end_ns == 0 {
            self.compute_end_ns = self.exec_end_ns;
        }
    }

    pub fn compute_ns(&self) -> u64 {
        self.compute_end_ns.saturating_sub(self.compute_start_ns)
    }
}

pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Request enumeration, response transport and statistics sinks.
///
/// Failures returned from the send, release and reporting calls are logged
/// by the cycle and never abort it.
pub trait Frontend: Send + Sync {
    /// Create the response object for `request`.
    fn create_response(&self, request: &InferenceRequest) -> Result<InferenceResponse>;

    /// Deliver a completed response.
    fn send_response(&self, response: InferenceResponse) -> Result<()>;

    /// Deliver `error` as the final outcome of `response`.
    fn send_error(&self, response: InferenceResponse, error: ServingError) -> Result<()>;

    /// Hand `request` back; the cycle no longer reads it.
    fn release_request(&self, request: InferenceRequest);

    fn report_request_statistics(
        &self,
        request: &InferenceRequest,
        success: bool,
        timing: &CycleTiming,
    ) -> Result<()>;

    fn report_batch_statistics(&self, total_batch_size: usize, timing: &CycleTiming) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreached_compute_marks_collapse() {
        let mut timing = CycleTiming::start();
        timing.mark_exec_end();
        assert!(timing.exec_start_ns <= timing.exec_end_ns);
        assert_eq!(timing.compute_start_ns, timing.exec_end_ns);
        assert_eq!(timing.compute_ns(), 0);
    }

    #[test]
    fn test_marks_are_ordered() {
        let mut timing = CycleTiming::start();
        timing.mark_compute_start();
        timing.mark_compute_end();
        timing.mark_exec_end();
        assert!(timing.exec_start_ns <= timing.compute_start_ns);
        assert!(timing.compute_start_ns <= timing.compute_end_ns);
        assert!(timing.compute_end_ns <= timing.exec_end_ns);
    }
}
