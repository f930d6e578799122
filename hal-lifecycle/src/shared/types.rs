use chrono::{DateTime, Utc};
use hal_core::{
    ActionKind, ActionResult, Composite, CompositeResult, Entity, Message, ModelNode, Operation,
    Server,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The command of an action: one operation or one atomic composite.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Single(Operation),
    Composite(Composite),
}

impl From<Operation> for Command {
    fn from(operation: Operation) -> Self {
        Command::Single(operation)
    }
}

impl From<Composite> for Command {
    fn from(composite: Composite) -> Self {
        Command::Composite(composite)
    }
}

/// Read issued on every poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollRead {
    Single(Operation),
    /// One read per affected sub-entity.
    Composite(Composite),
}

impl PollRead {
    /// A single read for one operation, a composite otherwise.
    pub fn for_operations(mut operations: Vec<Operation>) -> Self {
        if operations.len() == 1 {
            if let Some(operation) = operations.pop() {
                return PollRead::Single(operation);
            }
        }
        PollRead::Composite(Composite::from_operations(operations))
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollSnapshot {
    Single(ModelNode),
    Composite(CompositeResult),
}

impl PollSnapshot {
    /// Results of all successful reads in this snapshot.
    pub fn values(&self) -> Vec<&ModelNode> {
        match self {
            PollSnapshot::Single(node) => vec![node],
            PollSnapshot::Composite(result) => {
                result.results().filter(|node| !node.is_null()).collect()
            }
        }
    }
}

pub type Predicate = Arc<dyn Fn(&PollSnapshot) -> bool + Send + Sync>;

/// How an accepted command is verified.
#[derive(Clone)]
pub struct Verification {
    pub read: PollRead,
    pub predicate: Predicate,
    pub timeout: Duration,
    /// Keep polling through transport errors, e.g. while a host controller restarts.
    pub tolerate_transport_errors: bool,
}

impl Verification {
    pub fn new(read: PollRead, predicate: Predicate, timeout: Duration) -> Self {
        Self {
            read,
            predicate,
            timeout,
            tolerate_transport_errors: false,
        }
    }

    pub fn tolerating_transport_errors(mut self) -> Self {
        self.tolerate_transport_errors = true;
        self
    }
}

impl fmt::Debug for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verification")
            .field("read", &self.read)
            .field("timeout", &self.timeout)
            .field("tolerate_transport_errors", &self.tolerate_transport_errors)
            .finish_non_exhaustive()
    }
}

/// Extra read after a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    None,
    /// Fail the action when the server booted with errors.
    ReadBootErrors(Server),
    /// Publish a fresh snapshot of the stopped server.
    RefreshServer(Server),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    pub success: String,
    pub error: String,
    pub timeout: String,
    /// Published as info right after the action started.
    pub pending: Option<String>,
}

/// Everything needed to run one action, resolved before it starts.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    pub entity: Entity,
    pub action: ActionKind,
    pub servers: Vec<Server>,
    pub command: Command,
    pub verification: Option<Verification>,
    pub follow_up: FollowUp,
    pub messages: MessageTemplates,
}

impl ActionPlan {
    pub fn new(
        entity: impl Into<Entity>,
        action: ActionKind,
        command: impl Into<Command>,
        messages: MessageTemplates,
    ) -> Self {
        Self {
            entity: entity.into(),
            action,
            servers: Vec::new(),
            command: command.into(),
            verification: None,
            follow_up: FollowUp::None,
            messages,
        }
    }

    pub fn with_servers(mut self, servers: Vec<Server>) -> Self {
        self.servers = servers;
        self
    }

    pub fn verified_by(mut self, verification: Verification) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }
}

/// What one run produced. `result` is `None` when the action was superseded
/// and nothing was published.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action_id: Uuid,
    pub entity: Entity,
    pub result: Option<ActionResult>,
    pub message: Option<Message>,
    pub finished_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn new(
        action_id: Uuid,
        entity: Entity,
        result: Option<ActionResult>,
        message: Option<Message>,
    ) -> Self {
        Self {
            action_id,
            entity,
            result,
            message,
            finished_at: Utc::now(),
        }
    }

    /// Dropped because a later action on the same entity took over.
    pub fn superseded(action_id: Uuid, entity: Entity) -> Self {
        Self::new(action_id, entity, None, None)
    }

    pub fn is_superseded(&self) -> bool {
        self.result.is_none()
    }

    pub fn is_success(&self) -> bool {
        self.result == Some(ActionResult::Success)
    }
}
