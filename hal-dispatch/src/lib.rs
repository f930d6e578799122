pub mod http;
pub mod scripted;

use async_trait::async_trait;
use hal_core::{Composite, CompositeResult, CoreError, ModelNode, Operation};
use thiserror::Error;

pub use http::{HttpDispatcher, HttpDispatcherConfig};
pub use scripted::ScriptedDispatcher;

/// The two failure paths of a dispatch. Success is the `Ok` branch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The management endpoint rejected the operation.
    #[error("Operation failed: {0}")]
    Failure(String),
    /// The operation could not be delivered or its response could not be read.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }

    /// Raw failure text without the variant prefix.
    pub fn description(&self) -> &str {
        match self {
            DispatchError::Failure(text) | DispatchError::Transport(text) => text,
        }
    }
}

impl From<CoreError> for DispatchError {
    fn from(err: CoreError) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Executes management operations against a remote endpoint.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Execute a single operation and return its `result`.
    async fn execute(&self, operation: &Operation) -> DispatchResult<ModelNode>;

    /// Execute all steps atomically. A failed step fails the whole composite.
    async fn execute_composite(&self, composite: &Composite) -> DispatchResult<CompositeResult>;
}
