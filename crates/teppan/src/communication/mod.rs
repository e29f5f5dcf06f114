//! Requests, responses and the queue entries that carry them to a worker.

#[cfg(feature = "dispatch")]
mod queue_item;
mod request;
mod response;

#[cfg(feature = "dispatch")]
pub(crate) use queue_item::{Outcome, QueueItem};
pub use request::{InferenceRequest, RequestInput};
pub use response::{InferenceResponse, ResponseOutput};
