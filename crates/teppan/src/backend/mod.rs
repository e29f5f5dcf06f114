//! # Tensor Backend
//!
//! This module provides a unified interface over tensor runtimes, allowing the
//! execution core to marshal inputs and outputs in a runtime-agnostic manner.

//! ## Feature Flags
//!
//! The module uses feature flags to conditionally compile support for different runtimes:
//!
//! - `candle`: Enables support for the Candle tensor library
//!
//! ## Usage
//!
//! Users of this crate serve a model by:
//!
//! 1. Choosing a tensor type implementing [`RuntimeTensor`] ([`HostTensor`],
//!    or candle's `Tensor` with the `candle` feature)
//! 2. Implementing [`crate::model::Model`] for that tensor type
//! 3. Handing the model to a [`crate::execution::ModelInstance`]

mod core_trait;
mod host;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle tensor backend implementation.
///
/// This module is only available when the `candle` feature flag is enabled.
/// It provides an implementation of [`RuntimeTensor`] for Candle's `Tensor`
/// type, mapping serving data types onto candle's `DType`.
pub mod candle;

// Re-export the core trait for convenient imports
pub use core_trait::*;
pub use host::HostTensor;
