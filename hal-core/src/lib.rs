pub mod dmr;
pub mod timeouts;
pub mod topology;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use dmr::{Composite, CompositeResult, ModelNode, Operation, Outcome, ResourceAddress};
pub use topology::{
    Entity, EntityKey, Host, RunningState, Server, ServerConfigStatus, ServerGroup, SuspendState,
};

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Lifecycle action requested for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reload,
    Restart,
    Suspend,
    Resume,
    Start,
    Stop,
    Destroy,
    Kill,
    Remove,
    Copy,
}

impl ActionKind {
    /// Actions after which the server has booted and may report boot errors.
    pub fn is_start(self) -> bool {
        matches!(
            self,
            ActionKind::Start | ActionKind::Restart | ActionKind::Reload
        )
    }

    /// Actions after which the server is down.
    pub fn is_stop(self) -> bool {
        matches!(self, ActionKind::Stop | ActionKind::Destroy | ActionKind::Kill)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Reload => "reload",
            ActionKind::Restart => "restart",
            ActionKind::Suspend => "suspend",
            ActionKind::Resume => "resume",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Destroy => "destroy",
            ActionKind::Kill => "kill",
            ActionKind::Remove => "remove",
            ActionKind::Copy => "copy",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of one action attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Success => write!(f, "success"),
            ActionResult::Error => write!(f, "error"),
            ActionResult::Timeout => write!(f, "timeout"),
        }
    }
}

/// Error payload handed to callers at the process edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, text)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{} ({})", self.text, details),
            None => write!(f, "{}", self.text),
        }
    }
}
