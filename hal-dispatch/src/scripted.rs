use async_trait::async_trait;
use hal_core::{Composite, CompositeResult, ModelNode, Operation};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{DispatchError, DispatchResult, Dispatcher};

#[derive(Default)]
struct Script {
    operations: HashMap<String, VecDeque<DispatchResult<ModelNode>>>,
    composites: HashMap<String, VecDeque<DispatchResult<CompositeResult>>>,
    executed: Vec<Operation>,
    executed_composites: Vec<Composite>,
}

/// In-memory dispatcher replaying queued responses.
///
/// Responses are queued per operation name; composites are keyed by the name
/// of their first step. The last queued response of a name is repeated once
/// the queue is down to one entry, so a poll loop can keep reading a steady
/// state. Unscripted operations fail with [`DispatchError::Failure`].
#[derive(Default)]
pub struct ScriptedDispatcher {
    script: Mutex<Script>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self, operation: &str, response: DispatchResult<ModelNode>) -> &Self {
        self.script()
            .operations
            .entry(operation.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond(&self, operation: &str, result: ModelNode) -> &Self {
        self.on(operation, Ok(result))
    }

    pub fn fail(&self, operation: &str, description: &str) -> &Self {
        self.on(operation, Err(DispatchError::Failure(description.to_string())))
    }

    pub fn transport_error(&self, operation: &str, description: &str) -> &Self {
        self.on(operation, Err(DispatchError::Transport(description.to_string())))
    }

    pub fn on_composite(
        &self,
        first_step: &str,
        response: DispatchResult<CompositeResult>,
    ) -> &Self {
        self.script()
            .composites
            .entry(first_step.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_composite(&self, first_step: &str, result: CompositeResult) -> &Self {
        self.on_composite(first_step, Ok(result))
    }

    pub fn fail_composite(&self, first_step: &str, description: &str) -> &Self {
        self.on_composite(first_step, Err(DispatchError::Failure(description.to_string())))
    }

    /// Single operations executed so far, in order.
    pub fn executed(&self) -> Vec<Operation> {
        self.script().executed.clone()
    }

    /// Composites executed so far, in order.
    pub fn executed_composites(&self) -> Vec<Composite> {
        self.script().executed_composites.clone()
    }

    /// Number of single operations named `operation`.
    pub fn count(&self, operation: &str) -> usize {
        self.script()
            .executed
            .iter()
            .filter(|op| op.name() == operation)
            .count()
    }

    /// Number of composites whose first step is named `first_step`.
    pub fn composite_count(&self, first_step: &str) -> usize {
        self.script()
            .executed_composites
            .iter()
            .filter(|c| first_step_name(c) == first_step)
            .count()
    }
}

fn first_step_name(composite: &Composite) -> &str {
    composite.steps().first().map(Operation::name).unwrap_or("")
}

fn next<T: Clone>(queue: Option<&mut VecDeque<DispatchResult<T>>>, name: &str) -> DispatchResult<T> {
    match queue {
        Some(queue) if queue.len() > 1 => queue
            .pop_front()
            .unwrap_or_else(|| Err(unscripted(name))),
        Some(queue) => queue.front().cloned().unwrap_or_else(|| Err(unscripted(name))),
        None => Err(unscripted(name)),
    }
}

fn unscripted(name: &str) -> DispatchError {
    DispatchError::Failure(format!("no scripted response for '{}'", name))
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn execute(&self, operation: &Operation) -> DispatchResult<ModelNode> {
        let mut script = self.script();
        script.executed.push(operation.clone());
        let queue = script.operations.get_mut(operation.name());
        next(queue, operation.name())
    }

    async fn execute_composite(&self, composite: &Composite) -> DispatchResult<CompositeResult> {
        let mut script = self.script();
        script.executed_composites.push(composite.clone());
        let name = first_step_name(composite).to_string();
        let queue = script.composites.get_mut(&name);
        next(queue, &name)
    }
}
