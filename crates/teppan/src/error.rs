//! Error taxonomy for the execution core.
//!
//! Three families of failures exist:
//!
//! * [`SchemaError`] - raised once while building a model instance. An
//!   instance whose schema fails validation never executes.
//! * [`ModelError`] - raised by the wrapped model while loading or running.
//! * [`ServingError`] - the structured error that is delivered to a response.
//!   Every other failure is converted into one of these before it reaches the
//!   front-end.
use std::fmt;
use thiserror::Error;

/// Classification attached to every error delivered to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Internal,
    InvalidArgument,
    Unavailable,
    Unsupported,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Internal => write!(f, "internal"),
            ErrorCode::InvalidArgument => write!(f, "invalid argument"),
            ErrorCode::Unavailable => write!(f, "unavailable"),
            ErrorCode::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A classified, human readable error sent to the serving front-end.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ServingError {
    code: ErrorCode,
    message: String,
}

impl ServingError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A declared tensor name that does not follow `<base>__<index>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{name}' does not follow naming convention i.e. <name>__<index>")]
pub struct NamingConventionError {
    pub name: String,
}

/// Fatal, instance-level schema validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{kind} {source}")]
    NamingConvention {
        kind: &'static str,
        #[source]
        source: NamingConventionError,
    },
    #[error("unknown datatype {data_type} for {kind} '{name}' for model '{model}'")]
    UnknownDataType {
        kind: &'static str,
        name: String,
        data_type: String,
        model: String,
    },
    #[error("unsupported datatype {data_type} for {kind} '{name}' for model '{model}'")]
    UnsupportedDataType {
        kind: &'static str,
        name: String,
        data_type: String,
        model: String,
    },
    #[error("{kind} '{name}' refers to position {index} but model '{model}' takes {arity} inputs")]
    IndexOutOfRange {
        kind: &'static str,
        name: String,
        index: usize,
        arity: usize,
        model: String,
    },
    #[error("{kind} '{name}' is declared more than once for model '{model}'")]
    DuplicateName {
        kind: &'static str,
        name: String,
        model: String,
    },
    #[error("{kind}s '{first}' and '{second}' both map to position {index} for model '{model}'")]
    DuplicateIndex {
        kind: &'static str,
        first: String,
        second: String,
        index: usize,
        model: String,
    },
    #[error("sequence control {control} is declared by more than one control input for model '{model}'")]
    DuplicateControl {
        control: &'static str,
        model: String,
    },
    #[error("invalid sequence control {control} on '{name}' for model '{model}': {reason}")]
    InvalidControl {
        control: &'static str,
        name: String,
        model: String,
        reason: String,
    },
}

/// Failures raised by the wrapped model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{0}")]
    Forward(String),
    #[error("model panicked: {0}")]
    Panicked(String),
    #[error("failed to load model '{name}': {reason}")]
    Load { name: String, reason: String },
}

impl From<SchemaError> for ServingError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnsupportedDataType { .. } => ServingError::unsupported(err.to_string()),
            other => ServingError::internal(other.to_string()),
        }
    }
}

impl From<ModelError> for ServingError {
    fn from(err: ModelError) -> Self {
        ServingError::internal(err.to_string())
    }
}

pub type Result<T, E = ServingError> = std::result::Result<T, E>;
