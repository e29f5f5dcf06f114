//! # Teppan
//!
//! The execution core of a batched inference-serving backend.
//!
//! ## Overview
//!
//! A serving front-end groups independent inference requests into batches
//! and hands each batch to a model instance. This crate takes such a batch
//! and turns it into exactly one call of the wrapped model:
//!
//! - the per-request input tensors are fused into one aggregated tensor per
//!   model input, in request order,
//! - the model is called once with its inputs in positional order,
//! - every result is split back along the batch dimension and written into
//!   one response per request.
//!
//! Failures are isolated where they can be. A request with a malformed
//! input fails alone while the rest of the batch still runs; conditions
//! that make the whole call meaningless (an oversized batch, an allocation
//! failure, a model error) fail every request of the cycle. Either way every
//! request receives exactly one final outcome and is released.
//!
//! ## Architecture
//!
//! ### Schema
//!
//! Model inputs and outputs are named `<name>__<index>`, where the index is
//! the positional slot of the tensor in the model's argument or result list.
//! The [`schema::SchemaIndex`] is built from the [`config::ModelConfig`]
//! once, when a [`execution::ModelInstance`] is created.
//!
//! ### Collaborators
//!
//! The core talks to three collaborators through traits:
//!
//! - [`frontend::Frontend`] - request release, response transport and
//!   statistics
//! - [`memory::MemoryManager`] - buffer allocation and device copies
//! - [`model::Model`] - the opaque model, over any [`backend::RuntimeTensor`]
//!
//! ### Dispatch
//!
//! With the `dispatch` feature, [`dispatch::InstanceDispatcher`] queues
//! submitted requests and runs cycles on a background tokio task.
//!
//! ## Features
//!
//! - **dispatch** (default) - background request queue and worker
//! - **candle** - implements [`backend::RuntimeTensor`] for candle tensors

pub mod backend;
pub mod communication;
pub mod config;
pub mod dtype;
pub mod error;
pub mod execution;
pub mod frontend;
pub mod memory;
pub mod model;
pub mod schema;

#[cfg(feature = "dispatch")]
#[cfg_attr(docsrs, doc(cfg(feature = "dispatch")))]
pub mod dispatch;

pub use communication::{InferenceRequest, InferenceResponse, RequestInput, ResponseOutput};
pub use config::ModelConfig;
pub use dtype::DataType;
pub use error::{ErrorCode, ServingError};
pub use execution::{CycleState, ModelInstance};

pub mod prelude {
    pub use crate::backend::{HostTensor, RuntimeTensor};
    pub use crate::communication::{InferenceRequest, InferenceResponse, RequestInput, ResponseOutput};
    pub use crate::config::ModelConfig;
    #[cfg(feature = "dispatch")]
    pub use crate::dispatch::{ChannelFrontend, InstanceDispatcher, ResponseHandle};
    pub use crate::dtype::DataType;
    pub use crate::error::{ErrorCode, ModelError, ServingError};
    pub use crate::execution::{CycleState, ModelInstance};
    pub use crate::frontend::{CycleTiming, Frontend};
    pub use crate::memory::{Device, HostMemoryManager, MemoryManager};
    pub use crate::model::{Model, ModelLoader, ModelOutput};
}
