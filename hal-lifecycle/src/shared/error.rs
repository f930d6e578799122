use hal_core::CoreError;
use hal_dispatch::DispatchError;
use thiserror::Error;

/// Lifecycle specific errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid model: {0}")]
    Model(#[from] CoreError),
}

impl From<LifecycleError> for hal_core::ErrorResponse {
    fn from(err: LifecycleError) -> Self {
        let (code, message) = match &err {
            LifecycleError::Dispatch(DispatchError::Failure(msg)) => ("OPERATION_FAILED", msg.clone()),
            LifecycleError::Dispatch(DispatchError::Transport(msg)) => {
                ("TRANSPORT_ERROR", msg.clone())
            }
            LifecycleError::Precondition(msg) => ("PRECONDITION_FAILED", msg.clone()),
            LifecycleError::Unsupported(msg) => ("UNSUPPORTED", msg.clone()),
            LifecycleError::NotFound(msg) => ("NOT_FOUND", msg.clone()),
            LifecycleError::InvalidRequest(msg) => ("INVALID_REQUEST", msg.clone()),
            LifecycleError::Model(inner) => ("INVALID_MODEL", inner.to_string()),
        };

        hal_core::ErrorResponse::new(code, message)
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
