//! # Model
//!
//! The opaque model wrapped by an instance, and the single place it is
//! called from.
//!
//! A [`Model`] receives its inputs positionally, in the order the schema
//! index assigns, and returns either one result or an ordered tuple of
//! results. Models are called for inference only; implementations must not
//! record gradients or any other autodiff state.
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info};

use crate::backend::RuntimeTensor;
use crate::error::{ModelError, Result, ServingError};
use crate::memory::Device;

/// File name used when the configuration names no model artifact.
pub const DEFAULT_MODEL_FILENAME: &str = "model.pt";

/// What a forward pass produced.
#[derive(Debug, Clone)]
pub enum ModelOutput<T> {
    Single(T),
    Multiple(Vec<T>),
}

impl<T> ModelOutput<T> {
    /// The results as an ordered positional list.
    pub fn into_positional(self) -> Vec<T> {
        match self {
            ModelOutput::Single(tensor) => vec![tensor],
            ModelOutput::Multiple(tensors) => tensors,
        }
    }
}

impl<T> From<T> for ModelOutput<T> {
    fn from(tensor: T) -> Self {
        ModelOutput::Single(tensor)
    }
}

#[async_trait]
pub trait Model<T: RuntimeTensor>: Send + Sync {
    /// Run one forward pass over positional `inputs`.
    async fn forward(&self, inputs: Vec<T>) -> Result<ModelOutput<T>, ModelError>;
}

/// Deserializes a model artifact onto a device.
pub trait ModelLoader<T: RuntimeTensor> {
    type Model: Model<T>;

    fn load(&self, path: &Path, device: Device) -> Result<Self::Model, ModelError>;
}

/// Locate the artifact of `version` in a model repository.
///
/// The artifact lives at `<repository>/<version>/<artifact>`, where
/// `artifact` defaults to [`DEFAULT_MODEL_FILENAME`].
pub fn resolve_model_path(
    repository: &Path,
    version: u64,
    artifact: Option<&str>,
) -> Result<PathBuf> {
    let path = repository
        .join(version.to_string())
        .join(artifact.unwrap_or(DEFAULT_MODEL_FILENAME));
    if !path.exists() {
        return Err(ServingError::unavailable(format!(
            "unable to find '{}' for model instance",
            path.display()
        )));
    }
    info!(path = %path.display(), "resolved model artifact");
    Ok(path)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}

/// Call `model` once and normalize what it returns.
///
/// Errors and panics raised by the model become internal errors; a failed
/// call is never retried.
pub async fn invoke<T, M>(model: &M, inputs: Vec<T>) -> Result<Vec<T>>
where
    T: RuntimeTensor,
    M: Model<T> + ?Sized,
{
    let outcome = match AssertUnwindSafe(model.forward(inputs)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(ModelError::Panicked(panic_message(payload))),
    };
    outcome.map(ModelOutput::into_positional).map_err(|err| {
        error!(error = %err, "model forward pass failed");
        ServingError::internal(format!("model execute failure: {}", err))
    })
}
