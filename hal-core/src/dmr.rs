//! Management model: addresses, operations, composites and responses.
//!
//! Mirrors the JSON shape accepted by the HTTP management endpoint:
//! `{"operation": "read-resource", "address": [{"host": "primary"}], ...}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::{CoreError, Result};

/// Untyped management model node.
pub type ModelNode = Value;

/// Operation, parameter and attribute names.
pub mod names {
    pub const ADD: &str = "add";
    pub const COMPOSITE: &str = "composite";
    pub const DESTROY: &str = "destroy";
    pub const DESTROY_SERVERS: &str = "destroy-servers";
    pub const KILL: &str = "kill";
    pub const KILL_SERVERS: &str = "kill-servers";
    pub const READ_ATTRIBUTE: &str = "read-attribute";
    pub const READ_BOOT_ERRORS: &str = "read-boot-errors";
    pub const READ_CHILDREN_NAMES: &str = "read-children-names";
    pub const READ_RESOURCE: &str = "read-resource";
    pub const RELOAD: &str = "reload";
    pub const RELOAD_SERVERS: &str = "reload-servers";
    pub const REMOVE: &str = "remove";
    pub const RESTART: &str = "restart";
    pub const RESTART_SERVERS: &str = "restart-servers";
    pub const RESUME: &str = "resume";
    pub const RESUME_SERVERS: &str = "resume-servers";
    pub const SHUTDOWN: &str = "shutdown";
    pub const START: &str = "start";
    pub const START_SERVERS: &str = "start-servers";
    pub const STOP: &str = "stop";
    pub const STOP_SERVERS: &str = "stop-servers";
    pub const SUSPEND: &str = "suspend";
    pub const SUSPEND_SERVERS: &str = "suspend-servers";

    pub const ATTRIBUTES_ONLY: &str = "attributes-only";
    pub const BLOCKING: &str = "blocking";
    pub const CHILD_TYPE: &str = "child-type";
    pub const INCLUDE_RUNTIME: &str = "include-runtime";
    pub const NAME: &str = "name";
    pub const RECURSIVE: &str = "recursive";
    pub const START_MODE: &str = "start-mode";
    pub const SUSPEND_TIMEOUT: &str = "suspend-timeout";

    pub const CORE_SERVICE: &str = "core-service";
    pub const GROUP: &str = "group";
    pub const HOST: &str = "host";
    pub const MANAGEMENT: &str = "management";
    pub const SERVER: &str = "server";
    pub const SERVER_CONFIG: &str = "server-config";
    pub const SERVER_GROUP: &str = "server-group";
    pub const SERVER_STATE: &str = "server-state";
    pub const SOCKET_BINDING_PORT_OFFSET: &str = "socket-binding-port-offset";
    pub const STATUS: &str = "status";
    pub const SUSPEND_STATE: &str = "suspend-state";

    pub const OUTCOME: &str = "outcome";
    pub const RESULT: &str = "result";
    pub const FAILURE_DESCRIPTION: &str = "failure-description";
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
    pub const STEPS: &str = "steps";
}

/// Hierarchical address of a management resource, e.g. `/host=primary/server-config=s1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    segments: Vec<(String, String)>,
}

impl ResourceAddress {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn of(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::root().add(resource_type, name)
    }

    pub fn add(mut self, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        self.segments.push((resource_type.into(), name.into()));
        self
    }

    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Name of the last segment, `None` for the root address.
    pub fn last_name(&self) -> Option<&str> {
        self.segments.last().map(|(_, name)| name.as_str())
    }

    /// Parse the `/type=name/type=name` notation.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "/" {
            return Ok(Self::root());
        }

        let mut address = Self::root();
        for segment in trimmed.trim_start_matches('/').split('/') {
            let (resource_type, name) = segment
                .split_once('=')
                .filter(|(t, n)| !t.is_empty() && !n.is_empty())
                .ok_or_else(|| CoreError::InvalidAddress(input.to_string()))?;
            address = address.add(resource_type, name);
        }
        Ok(address)
    }

    pub fn to_model(&self) -> ModelNode {
        Value::Array(
            self.segments
                .iter()
                .map(|(resource_type, name)| {
                    let mut segment = Map::new();
                    segment.insert(resource_type.clone(), Value::String(name.clone()));
                    Value::Object(segment)
                })
                .collect(),
        )
    }

    /// Read an address from its model form: a list of single-key objects.
    pub fn from_model(node: &ModelNode) -> Result<Self> {
        let items = node
            .as_array()
            .ok_or_else(|| CoreError::InvalidAddress(node.to_string()))?;

        let mut address = Self::root();
        for item in items {
            let (resource_type, name) = item
                .as_object()
                .and_then(|segment| segment.iter().next())
                .and_then(|(t, n)| n.as_str().map(|n| (t.clone(), n.to_string())))
                .ok_or_else(|| CoreError::InvalidAddress(node.to_string()))?;
            address = address.add(resource_type, name);
        }
        Ok(address)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for (resource_type, name) in &self.segments {
            write!(f, "/{}={}", resource_type, name)?;
        }
        Ok(())
    }
}

impl Serialize for ResourceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_model().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let node = Value::deserialize(deserializer)?;
        Self::from_model(&node).map_err(serde::de::Error::custom)
    }
}

/// A single management operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    address: ResourceAddress,
    parameters: Map<String, Value>,
}

impl Operation {
    pub fn new(address: ResourceAddress, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address,
            parameters: Map::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Copy every attribute of `model` into the parameters. Used for `add`
    /// operations built from a resource snapshot. Child resources are skipped.
    pub fn payload(mut self, model: &ModelNode) -> Self {
        if let Some(attributes) = model.as_object() {
            for (key, value) in attributes {
                if key == "operation" || key == "address" || is_child_container(value) {
                    continue;
                }
                self.parameters.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn to_model(&self) -> ModelNode {
        let mut node = Map::new();
        node.insert("operation".to_string(), Value::String(self.name.clone()));
        node.insert("address".to_string(), self.address.to_model());
        for (key, value) in &self.parameters {
            node.insert(key.clone(), value.clone());
        }
        Value::Object(node)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.name)
    }
}

/// Child resources show up as objects whose values are all objects:
/// `"jvm": {"default": {...}}`.
fn is_child_container(value: &Value) -> bool {
    match value.as_object() {
        Some(children) => !children.is_empty() && children.values().all(Value::is_object),
        None => false,
    }
}

/// Ordered batch of operations executed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    steps: Vec<Operation>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(steps: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn push(&mut self, operation: Operation) {
        self.steps.push(operation);
    }

    pub fn steps(&self) -> &[Operation] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_model(&self) -> ModelNode {
        json!({
            "operation": names::COMPOSITE,
            "address": [],
            "steps": self.steps.iter().map(Operation::to_model).collect::<Vec<_>>(),
        })
    }
}

impl FromIterator<Operation> for Composite {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self::from_operations(iter)
    }
}

/// Outcome of one executed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(ModelNode),
    Failed(String),
}

impl Outcome {
    /// Parse a `{"outcome": .., "result": ..}` response node.
    pub fn from_response(response: &ModelNode) -> Result<Self> {
        match response.get(names::OUTCOME).and_then(Value::as_str) {
            Some(names::SUCCESS) => Ok(Outcome::Success(
                response.get(names::RESULT).cloned().unwrap_or(Value::Null),
            )),
            Some(names::FAILED) => Ok(Outcome::Failed(failure_description(response))),
            Some(other) => Err(CoreError::InvalidResponse(format!(
                "unknown outcome '{}'",
                other
            ))),
            None => Err(CoreError::InvalidResponse(
                "response has no outcome".to_string(),
            )),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Text of `failure-description`, which is either a string or a nested node.
pub fn failure_description(response: &ModelNode) -> String {
    match response.get(names::FAILURE_DESCRIPTION) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "unknown failure".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Per-step results of a composite operation, in step order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeResult {
    steps: Vec<ModelNode>,
}

impl CompositeResult {
    pub fn from_steps(steps: Vec<ModelNode>) -> Self {
        Self { steps }
    }

    /// Build from the `result` of a composite response: `{"step-1": {..}, "step-2": {..}}`.
    pub fn from_result(result: &ModelNode) -> Result<Self> {
        let object = result.as_object().ok_or_else(|| {
            CoreError::InvalidResponse("composite result is not an object".to_string())
        })?;

        let mut indexed = Vec::with_capacity(object.len());
        for (key, step) in object {
            let index = key
                .strip_prefix("step-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    CoreError::InvalidResponse(format!("unexpected composite key '{}'", key))
                })?;
            indexed.push((index, step.clone()));
        }
        indexed.sort_by_key(|(index, _)| *index);

        Ok(Self {
            steps: indexed.into_iter().map(|(_, step)| step).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step node by zero-based index.
    pub fn step(&self, index: usize) -> Option<&ModelNode> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> impl Iterator<Item = &ModelNode> {
        self.steps.iter()
    }

    /// The `result` of every step; `Null` for failed steps.
    pub fn results(&self) -> impl Iterator<Item = &ModelNode> {
        self.steps
            .iter()
            .map(|step| step.get(names::RESULT).unwrap_or(&Value::Null))
    }

    pub fn to_model(&self) -> ModelNode {
        let mut result = Map::new();
        for (index, step) in self.steps.iter().enumerate() {
            result.insert(format!("step-{}", index + 1), step.clone());
        }
        Value::Object(result)
    }
}

/// String value of `attribute` in `node`.
pub fn attribute_str<'a>(node: &'a ModelNode, attribute: &str) -> Option<&'a str> {
    node.get(attribute).and_then(Value::as_str)
}

/// Iterate the named child resources of `node` of type `child_type`.
pub fn children<'a>(
    node: &'a ModelNode,
    child_type: &str,
) -> impl Iterator<Item = (&'a String, &'a ModelNode)> {
    node.get(child_type)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|children| children.iter())
        .filter(|(_, child)| child.is_object())
}
