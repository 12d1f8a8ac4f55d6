//! Error type for MLP operations.

use std::fmt;

/// Error type for network construction, training, and persistence.
#[derive(Debug)]
pub enum MlpError {
    /// Unknown activation name passed to the registry.
    UnknownActivation(String),
    /// Unknown solver name passed to the registry.
    UnknownOptimizer(String),
    /// Unknown loss name passed to the registry.
    UnknownLoss(String),
    /// Incompatible matrix dimensions at the API boundary.
    ShapeMismatch(String),
    /// Invalid network or training configuration.
    InvalidConfig(String),
    /// A non-finite value was produced during a pass. Training has
    /// diverged and the current fit call is aborted.
    NonFinite { layer: usize },
    /// Checkpoint file I/O failure.
    Io(std::io::Error),
    /// Checkpoint (de)serialization failure.
    Json(serde_json::Error),
}

impl fmt::Display for MlpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlpError::UnknownActivation(name) => write!(f, "unknown activation: {name}"),
            MlpError::UnknownOptimizer(name) => write!(f, "unknown solver: {name}"),
            MlpError::UnknownLoss(name) => write!(f, "unknown loss: {name}"),
            MlpError::ShapeMismatch(msg) => write!(f, "shape mismatch: {msg}"),
            MlpError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MlpError::NonFinite { layer } => write!(
                f,
                "non-finite value in layer {layer} predictions; training diverged \
                 (a lower learning rate usually fixes this)"
            ),
            MlpError::Io(err) => write!(f, "checkpoint i/o: {err}"),
            MlpError::Json(err) => write!(f, "checkpoint encoding: {err}"),
        }
    }
}

impl std::error::Error for MlpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MlpError::Io(err) => Some(err),
            MlpError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MlpError {
    fn from(err: std::io::Error) -> Self {
        MlpError::Io(err)
    }
}

impl From<serde_json::Error> for MlpError {
    fn from(err: serde_json::Error) -> Self {
        MlpError::Json(err)
    }
}

pub type MlpResult<T> = Result<T, MlpError>;
