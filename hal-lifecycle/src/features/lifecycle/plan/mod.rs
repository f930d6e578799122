//! Strategy table and plan builders.
//!
//! Every lifecycle action is resolved once into an [`ActionPlan`]: the command
//! to send, how to verify it, what to do afterwards and which messages to show.
//! Preconditions are checked here so a refused action never touches the
//! pending registry.

use hal_core::dmr::names;
use hal_core::timeouts::{host_timeout, server_group_timeout, server_timeout};
use hal_core::{
    ActionKind, Composite, Host, ModelNode, Operation, ResourceAddress, RunningState, Server,
    ServerConfigStatus, ServerGroup, SuspendState,
};
use serde_json::Value;

use crate::features::polling::service::{
    any_response, config_status_in, running_state_is, suspend_state_is,
};
use crate::shared::config::LifecycleConfig;
use crate::shared::error::{LifecycleError, LifecycleResult};
use crate::shared::types::{
    ActionPlan, FollowUp, MessageTemplates, PollRead, Predicate, Verification,
};

/// Nesting depth copied by [`Planner::copy_server_group`].
pub const COPY_DEPTH: usize = 2;

/// Child resources carried over by [`Planner::copy_server`].
pub const SERVER_COPY_CHILDREN: [&str; 5] = ["jvm", "interface", "path", "system-property", "ssl"];

const STOPPED: &[ServerConfigStatus] = &[ServerConfigStatus::Stopped, ServerConfigStatus::Disabled];
const STARTED: &[ServerConfigStatus] = &[ServerConfigStatus::Started];

/// End state the affected servers have to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    ConfigStatus(&'static [ServerConfigStatus]),
    SuspendState(SuspendState),
    /// Nothing to observe.
    Unobservable,
}

impl TargetState {
    /// Read of this state for one server.
    pub fn read(self, server: &Server) -> Option<Operation> {
        match self {
            TargetState::ConfigStatus(_) => Some(
                Operation::new(server.server_config_address(), names::READ_ATTRIBUTE)
                    .param(names::NAME, names::STATUS),
            ),
            TargetState::SuspendState(_) => Some(
                Operation::new(server.server_address(), names::READ_ATTRIBUTE)
                    .param(names::NAME, names::SUSPEND_STATE),
            ),
            TargetState::Unobservable => None,
        }
    }

    /// Holds when `servers` reads report this state.
    pub fn predicate(self, servers: usize) -> Option<Predicate> {
        match self {
            TargetState::ConfigStatus(statuses) => Some(config_status_in(servers, statuses)),
            TargetState::SuspendState(state) => Some(suspend_state_is(servers, state)),
            TargetState::Unobservable => None,
        }
    }
}

/// Strategy record of one [`ActionKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionStrategy {
    pub operation: &'static str,
    pub group_operation: &'static str,
    pub target: TargetState,
    pub past_tense: &'static str,
}

pub fn strategy(action: ActionKind) -> ActionStrategy {
    let (operation, group_operation, target, past_tense) = match action {
        ActionKind::Reload => (
            names::RELOAD,
            names::RELOAD_SERVERS,
            TargetState::ConfigStatus(STARTED),
            "reloaded",
        ),
        ActionKind::Restart => (
            names::RESTART,
            names::RESTART_SERVERS,
            TargetState::ConfigStatus(STARTED),
            "restarted",
        ),
        ActionKind::Suspend => (
            names::SUSPEND,
            names::SUSPEND_SERVERS,
            TargetState::SuspendState(SuspendState::Suspended),
            "suspended",
        ),
        ActionKind::Resume => (
            names::RESUME,
            names::RESUME_SERVERS,
            TargetState::SuspendState(SuspendState::Running),
            "resumed",
        ),
        ActionKind::Start => (
            names::START,
            names::START_SERVERS,
            TargetState::ConfigStatus(STARTED),
            "started",
        ),
        ActionKind::Stop => (
            names::STOP,
            names::STOP_SERVERS,
            TargetState::ConfigStatus(STOPPED),
            "stopped",
        ),
        ActionKind::Destroy => (
            names::DESTROY,
            names::DESTROY_SERVERS,
            TargetState::ConfigStatus(STOPPED),
            "destroyed",
        ),
        ActionKind::Kill => (
            names::KILL,
            names::KILL_SERVERS,
            TargetState::ConfigStatus(STOPPED),
            "killed",
        ),
        ActionKind::Remove => (
            names::REMOVE,
            names::REMOVE,
            TargetState::Unobservable,
            "removed",
        ),
        ActionKind::Copy => (names::ADD, names::ADD, TargetState::Unobservable, "added"),
    };
    ActionStrategy {
        operation,
        group_operation,
        target,
        past_tense,
    }
}

/// How an entity is named in user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    Server,
    Host,
    DomainController,
    ServerGroup,
}

impl EntityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityLabel::Server => "Server",
            EntityLabel::Host => "Host",
            EntityLabel::DomainController => "Domain controller",
            EntityLabel::ServerGroup => "Server group",
        }
    }

    fn lower(self) -> String {
        self.as_str().to_lowercase()
    }
}

impl MessageTemplates {
    pub fn for_action(label: EntityLabel, name: &str, action: ActionKind) -> Self {
        let past = strategy(action).past_tense;
        let verb = match action {
            ActionKind::Copy => "add",
            other => other.as_str(),
        };
        Self {
            success: format!("{} {} successfully {}.", label.as_str(), name, past),
            error: format!("Could not {} {} {}.", verb, label.lower(), name),
            timeout: format!(
                "Timeout while waiting for {} {} to be {}. The operation may still be in progress.",
                label.lower(),
                name,
                past
            ),
            pending: None,
        }
    }

    pub fn with_pending(mut self, pending: impl Into<String>) -> Self {
        self.pending = Some(pending.into());
        self
    }
}

/// Parameters collected from the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// Seconds to wait for in-flight requests when suspending or stopping.
    pub suspend_timeout: Option<u64>,
    /// Start the servers in suspended mode.
    pub start_suspended: bool,
    /// Restart the servers of a host while reloading it.
    pub restart_servers: bool,
}

impl ActionOptions {
    pub fn suspend_timeout(seconds: u64) -> Self {
        Self {
            suspend_timeout: Some(seconds),
            ..Self::default()
        }
    }

    pub fn start_suspended() -> Self {
        Self {
            start_suspended: true,
            ..Self::default()
        }
    }

    pub fn restart_servers(restart: bool) -> Self {
        Self {
            restart_servers: restart,
            ..Self::default()
        }
    }

    fn extra_budget(&self, action: ActionKind) -> u64 {
        match action {
            ActionKind::Suspend | ActionKind::Stop => self.suspend_timeout.unwrap_or(0),
            _ => 0,
        }
    }

    fn apply(&self, action: ActionKind, mut operation: Operation) -> Operation {
        if matches!(
            action,
            ActionKind::Reload | ActionKind::Restart | ActionKind::Start | ActionKind::Stop
        ) {
            operation = operation.param(names::BLOCKING, false);
        }
        if matches!(action, ActionKind::Suspend | ActionKind::Stop) {
            if let Some(timeout) = self.suspend_timeout {
                operation = operation.param(names::SUSPEND_TIMEOUT, timeout);
            }
        }
        if action == ActionKind::Start && self.start_suspended {
            operation = operation.param(names::START_MODE, names::SUSPEND);
        }
        operation
    }
}

/// Target of a server copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCopy {
    pub host: String,
    pub name: String,
    /// Defaults to the group of the source server.
    pub group: Option<String>,
    pub port_offset: Option<i64>,
}

/// Resolves actions into plans.
#[derive(Debug, Clone)]
pub struct Planner {
    config: LifecycleConfig,
}

impl Planner {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn verification(
        &self,
        servers: &[Server],
        target: TargetState,
        seconds: u64,
    ) -> Option<Verification> {
        if servers.is_empty() {
            return None;
        }
        let reads: Vec<Operation> = servers.iter().filter_map(|s| target.read(s)).collect();
        let predicate = target.predicate(servers.len())?;
        if reads.is_empty() {
            return None;
        }
        Some(Verification::new(
            PollRead::for_operations(reads),
            predicate,
            self.config.budget(seconds),
        ))
    }

    // ------------------------------------------------------ server group

    pub fn server_group(
        &self,
        group: &ServerGroup,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionPlan> {
        let affected = match action {
            ActionKind::Reload | ActionKind::Restart | ActionKind::Suspend | ActionKind::Stop => {
                require(group, group.servers_matching(Server::is_started), "started")?
            }
            ActionKind::Resume => {
                require(group, group.servers_matching(Server::is_suspended), "suspended")?
            }
            ActionKind::Start => require(
                group,
                group.servers_matching(|s| s.is_stopped() || s.is_failed()),
                "stopped",
            )?,
            ActionKind::Destroy | ActionKind::Kill => group.servers_matching(Server::is_started),
            ActionKind::Remove | ActionKind::Copy => {
                return Err(LifecycleError::InvalidRequest(format!(
                    "{} of server group {} is not a server action",
                    action, group.name
                )))
            }
        };

        let strategy = strategy(action);
        let operation = options.apply(
            action,
            Operation::new(group.address(), strategy.group_operation),
        );
        let seconds = options.extra_budget(action) + server_group_timeout(affected.len(), action);
        let verification = self.verification(&affected, strategy.target, seconds);
        let messages = MessageTemplates::for_action(EntityLabel::ServerGroup, &group.name, action);

        let mut plan = ActionPlan::new(group.clone(), action, operation, messages)
            .with_servers(affected);
        plan.verification = verification;
        Ok(plan)
    }

    /// One composite removing every stopped server and then the group.
    pub fn remove_server_group(&self, group: &ServerGroup) -> ActionPlan {
        let stopped = group.servers_matching(Server::is_stopped);
        let mut composite: Composite = stopped
            .iter()
            .map(|server| Operation::new(server.server_config_address(), names::REMOVE))
            .collect();
        composite.push(Operation::new(group.address(), names::REMOVE));

        let messages =
            MessageTemplates::for_action(EntityLabel::ServerGroup, &group.name, ActionKind::Remove);
        ActionPlan::new(group.clone(), ActionKind::Remove, composite, messages).with_servers(stopped)
    }

    /// Recursive read of the source group, input to [`Planner::copy_server_group`].
    pub fn read_for_copy(address: ResourceAddress) -> Operation {
        Operation::new(address, names::READ_RESOURCE).param(names::RECURSIVE, true)
    }

    /// One composite adding the new group and its nested resources.
    pub fn copy_server_group(
        &self,
        source: &ServerGroup,
        snapshot: &ModelNode,
        new_name: &str,
    ) -> LifecycleResult<ActionPlan> {
        validate_name(new_name)?;
        let target = ServerGroup::new(new_name);
        let mut composite = Composite::new();
        composite.push(Operation::new(target.address(), names::ADD).payload(snapshot));
        add_child_operations(&mut composite, snapshot, &target.address(), COPY_DEPTH);

        let messages =
            MessageTemplates::for_action(EntityLabel::ServerGroup, new_name, ActionKind::Copy);
        Ok(ActionPlan::new(source.clone(), ActionKind::Copy, composite, messages))
    }

    // ------------------------------------------------------ server

    pub fn server(
        &self,
        server: &Server,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionPlan> {
        if matches!(action, ActionKind::Suspend | ActionKind::Resume) && !server.supports_suspend() {
            return Err(LifecycleError::Unsupported(format!(
                "Server {} does not support {}",
                server.name, action
            )));
        }
        if server.standalone {
            return self.standalone_server(server, action, options);
        }

        match action {
            ActionKind::Remove => return self.remove_server(server),
            ActionKind::Copy => {
                return Err(LifecycleError::InvalidRequest(
                    "copying a server needs a target".to_string(),
                ))
            }
            _ => {}
        }

        let strategy = strategy(action);
        let operation = options.apply(
            action,
            Operation::new(server.server_config_address(), strategy.operation),
        );
        let seconds = options.extra_budget(action) + server_timeout(action);
        let messages = MessageTemplates::for_action(EntityLabel::Server, &server.name, action);

        let mut plan = ActionPlan::new(server.clone(), action, operation, messages);
        plan.verification =
            self.verification(std::slice::from_ref(server), strategy.target, seconds);
        if action.is_start() {
            plan.follow_up = FollowUp::ReadBootErrors(server.clone());
        } else if action.is_stop() {
            plan.follow_up = FollowUp::RefreshServer(server.clone());
        }
        Ok(plan)
    }

    fn standalone_server(
        &self,
        server: &Server,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionPlan> {
        let root = ResourceAddress::root();
        let read_state = |attribute: &str| {
            PollRead::Single(
                Operation::new(root.clone(), names::READ_ATTRIBUTE).param(names::NAME, attribute),
            )
        };

        let (operation, read, predicate) = match action {
            ActionKind::Reload => (
                Operation::new(root.clone(), names::RELOAD),
                read_state(names::SERVER_STATE),
                running_state_is(RunningState::Running),
            ),
            ActionKind::Restart => (
                Operation::new(root.clone(), names::SHUTDOWN).param(names::RESTART, true),
                PollRead::Single(Operation::new(root.clone(), names::READ_RESOURCE)),
                any_response(),
            ),
            ActionKind::Suspend => (
                options.apply(action, Operation::new(root.clone(), names::SUSPEND)),
                read_state(names::SUSPEND_STATE),
                suspend_state_is(1, SuspendState::Suspended),
            ),
            ActionKind::Resume => (
                Operation::new(root.clone(), names::RESUME),
                read_state(names::SUSPEND_STATE),
                suspend_state_is(1, SuspendState::Running),
            ),
            other => {
                return Err(LifecycleError::Unsupported(format!(
                    "{} is not available for a standalone server",
                    other
                )))
            }
        };

        let seconds = options.extra_budget(action) + server_timeout(action);
        let verification = Verification::new(read, predicate, self.config.budget(seconds))
            .tolerating_transport_errors();
        let messages = MessageTemplates::for_action(EntityLabel::Server, &server.name, action);
        let mut plan = ActionPlan::new(server.clone(), action, operation, messages)
            .verified_by(verification);
        if action.is_start() {
            plan.follow_up = FollowUp::ReadBootErrors(server.clone());
        }
        Ok(plan)
    }

    pub fn remove_server(&self, server: &Server) -> LifecycleResult<ActionPlan> {
        if server.standalone {
            return Err(LifecycleError::Unsupported(
                "a standalone server cannot be removed".to_string(),
            ));
        }
        if !server.is_stopped() {
            return Err(LifecycleError::Precondition(format!(
                "Server {} must be stopped before it can be removed.",
                server.name
            )));
        }
        let operation = Operation::new(server.server_config_address(), names::REMOVE);
        let messages =
            MessageTemplates::for_action(EntityLabel::Server, &server.name, ActionKind::Remove);
        Ok(ActionPlan::new(server.clone(), ActionKind::Remove, operation, messages))
    }

    /// One composite adding the new server config and its nested resources.
    pub fn copy_server(
        &self,
        source: &Server,
        snapshot: &ModelNode,
        target: &ServerCopy,
    ) -> LifecycleResult<ActionPlan> {
        validate_name(&target.name)?;
        validate_name(&target.host)?;
        let group = target
            .group
            .clone()
            .or_else(|| source.server_group.clone())
            .ok_or_else(|| {
                LifecycleError::InvalidRequest(format!(
                    "no server group known for the copy of {}",
                    source.name
                ))
            })?;

        let address = ResourceAddress::of(names::HOST, &target.host)
            .add(names::SERVER_CONFIG, &target.name);
        let mut add = Operation::new(address.clone(), names::ADD)
            .payload(snapshot)
            .param(names::GROUP, group)
            .param(names::NAME, target.name.as_str());
        if let Some(offset) = target.port_offset {
            add = add.param(names::SOCKET_BINDING_PORT_OFFSET, offset);
        }

        let mut composite = Composite::new();
        composite.push(add);
        for child_type in SERVER_COPY_CHILDREN {
            for (name, child) in hal_core::dmr::children(snapshot, child_type) {
                composite.push(
                    Operation::new(address.clone().add(child_type, name), names::ADD).payload(child),
                );
            }
        }

        let messages =
            MessageTemplates::for_action(EntityLabel::Server, &target.name, ActionKind::Copy);
        Ok(ActionPlan::new(source.clone(), ActionKind::Copy, composite, messages))
    }

    // ------------------------------------------------------ host

    pub fn host(
        &self,
        host: &Host,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionPlan> {
        let (operation, affected) = match action {
            ActionKind::Reload => (
                Operation::new(host.address(), names::RELOAD)
                    .param(names::RESTART_SERVERS, options.restart_servers),
                if options.restart_servers {
                    host.servers_matching(Server::is_started)
                } else {
                    Vec::new()
                },
            ),
            ActionKind::Restart => (
                Operation::new(host.address(), names::SHUTDOWN).param(names::RESTART, true),
                host.servers.clone(),
            ),
            other => {
                return Err(LifecycleError::Unsupported(format!(
                    "{} is not available for host {}",
                    other, host.name
                )))
            }
        };

        let timeout = self.config.budget(host_timeout(affected.len(), action));
        let verification =
            Verification::new(ping(host), any_response(), timeout).tolerating_transport_errors();

        let label = if host.domain_controller {
            EntityLabel::DomainController
        } else {
            EntityLabel::Host
        };
        let mut messages = MessageTemplates::for_action(label, &host.name, action);
        if host.domain_controller {
            messages = messages.with_pending(format!(
                "Domain controller {} is being {}. The console will lose its connection until it is back.",
                host.name,
                match action {
                    ActionKind::Restart => "restarted",
                    _ => "reloaded",
                }
            ));
        }

        Ok(ActionPlan::new(host.clone(), action, operation, messages)
            .with_servers(affected)
            .verified_by(verification))
    }
}

/// Read of the host and each of its started servers.
fn ping(host: &Host) -> PollRead {
    let mut reads = vec![Operation::new(host.address(), names::READ_RESOURCE)];
    reads.extend(
        host.servers_matching(Server::is_started)
            .iter()
            .map(|server| {
                Operation::new(
                    host.address().add(names::SERVER, &server.name),
                    names::READ_RESOURCE,
                )
            }),
    );
    PollRead::for_operations(reads)
}

fn require(group: &ServerGroup, servers: Vec<Server>, state: &str) -> LifecycleResult<Vec<Server>> {
    if servers.is_empty() {
        return Err(LifecycleError::Precondition(format!(
            "Server group {} has no {} servers.",
            group.name, state
        )));
    }
    Ok(servers)
}

fn validate_name(name: &str) -> LifecycleResult<()> {
    if name.trim().is_empty() || name.contains('/') || name.contains('=') {
        return Err(LifecycleError::InvalidRequest(format!(
            "'{}' is not a valid resource name",
            name
        )));
    }
    Ok(())
}

/// Add one `add` per nested child resource of `model`, `depth` levels deep.
fn add_child_operations(
    composite: &mut Composite,
    model: &ModelNode,
    base: &ResourceAddress,
    depth: usize,
) {
    if depth == 0 {
        return;
    }
    let Some(attributes) = model.as_object() else {
        return;
    };
    for (child_type, value) in attributes {
        let Some(resources) = value.as_object() else {
            continue;
        };
        for (name, resource) in resources {
            if !matches!(resource, Value::Object(_)) {
                continue;
            }
            let address = base.clone().add(child_type, name);
            composite.push(Operation::new(address.clone(), names::ADD).payload(resource));
            add_child_operations(composite, resource, &address, depth - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{Command, PollSnapshot};
    use hal_core::CompositeResult;
    use semver::Version;
    use serde_json::json;
    use std::time::Duration;

    fn planner() -> Planner {
        Planner::new(LifecycleConfig::default())
    }

    fn started(host: &str, name: &str) -> Server {
        Server::new(host, name).with_config_status(ServerConfigStatus::Started)
    }

    fn stopped(host: &str, name: &str) -> Server {
        Server::new(host, name).with_config_status(ServerConfigStatus::Stopped)
    }

    fn group() -> ServerGroup {
        ServerGroup::new("main-server-group").with_servers(vec![
            started("primary", "server-one"),
            started("primary", "server-two"),
            stopped("secondary", "server-three"),
        ])
    }

    fn single(plan: &ActionPlan) -> &Operation {
        match &plan.command {
            Command::Single(operation) => operation,
            other => panic!("expected a single operation, got {:?}", other),
        }
    }

    fn composite(plan: &ActionPlan) -> &Composite {
        match &plan.command {
            Command::Composite(composite) => composite,
            other => panic!("expected a composite, got {:?}", other),
        }
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(strategy(ActionKind::Reload).group_operation, "reload-servers");
        assert_eq!(strategy(ActionKind::Kill).operation, "kill");
        assert_eq!(
            strategy(ActionKind::Stop).target,
            TargetState::ConfigStatus(STOPPED)
        );
        assert_eq!(
            strategy(ActionKind::Resume).target,
            TargetState::SuspendState(SuspendState::Running)
        );
        assert_eq!(strategy(ActionKind::Remove).target, TargetState::Unobservable);
    }

    #[test]
    fn test_message_templates() {
        let messages =
            MessageTemplates::for_action(EntityLabel::ServerGroup, "main-server-group", ActionKind::Reload);
        assert_eq!(messages.success, "Server group main-server-group successfully reloaded.");
        assert_eq!(messages.error, "Could not reload server group main-server-group.");
        assert!(messages.timeout.contains("main-server-group"));
        assert!(messages.pending.is_none());
    }

    #[test]
    fn test_group_reload_targets_started_servers() {
        let plan = planner()
            .server_group(&group(), ActionKind::Reload, ActionOptions::default())
            .unwrap();

        let operation = single(&plan);
        assert_eq!(operation.name(), "reload-servers");
        assert_eq!(operation.address().to_string(), "/server-group=main-server-group");
        assert_eq!(operation.parameter("blocking"), Some(&json!(false)));
        assert_eq!(plan.servers.len(), 2);

        let verification = plan.verification.as_ref().unwrap();
        assert_eq!(verification.timeout, Duration::from_secs(10 + 5 * 2));
        assert!(!verification.tolerate_transport_errors);
        match &verification.read {
            PollRead::Composite(reads) => {
                assert_eq!(reads.len(), 2);
                assert_eq!(
                    reads.steps()[0].address().to_string(),
                    "/host=primary/server-config=server-one"
                );
                assert_eq!(reads.steps()[0].parameter("name"), Some(&json!("status")));
            }
            other => panic!("unexpected read {:?}", other),
        }

        let all_started = PollSnapshot::Composite(CompositeResult::from_steps(vec![
            json!({"outcome": "success", "result": "STARTED"}),
            json!({"outcome": "success", "result": "STARTED"}),
        ]));
        assert!((verification.predicate)(&all_started));
    }

    #[test]
    fn test_group_stop_adds_suspend_timeout() {
        let plan = planner()
            .server_group(&group(), ActionKind::Stop, ActionOptions::suspend_timeout(30))
            .unwrap();
        assert_eq!(single(&plan).parameter("suspend-timeout"), Some(&json!(30)));
        assert_eq!(
            plan.verification.unwrap().timeout,
            Duration::from_secs(30 + 10 + 4 * 2)
        );
    }

    #[test]
    fn test_group_preconditions() {
        let idle = ServerGroup::new("other-server-group")
            .with_servers(vec![stopped("primary", "server-four")]);

        for action in [ActionKind::Reload, ActionKind::Restart, ActionKind::Suspend, ActionKind::Stop] {
            let err = planner()
                .server_group(&idle, action, ActionOptions::default())
                .unwrap_err();
            assert!(matches!(err, LifecycleError::Precondition(_)), "{}", action);
        }
        let err = planner()
            .server_group(&idle, ActionKind::Resume, ActionOptions::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Precondition failed: Server group other-server-group has no suspended servers."
        );

        let plan = planner()
            .server_group(&idle, ActionKind::Start, ActionOptions::start_suspended())
            .unwrap();
        assert_eq!(single(&plan).parameter("start-mode"), Some(&json!("suspend")));
        assert_eq!(plan.servers.len(), 1);
    }

    #[test]
    fn test_group_kill_without_started_servers_is_not_verified() {
        let idle = ServerGroup::new("other-server-group")
            .with_servers(vec![stopped("primary", "server-four")]);
        let plan = planner()
            .server_group(&idle, ActionKind::Kill, ActionOptions::default())
            .unwrap();
        assert!(plan.verification.is_none());
    }

    #[test]
    fn test_remove_group_batches_stopped_servers() {
        let group = ServerGroup::new("main-server-group").with_servers(vec![
            stopped("primary", "server-one"),
            Server::new("secondary", "server-two").with_config_status(ServerConfigStatus::Disabled),
            started("secondary", "server-three"),
        ]);
        let plan = planner().remove_server_group(&group);

        let steps = composite(&plan).steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].address().to_string(), "/host=primary/server-config=server-one");
        assert_eq!(steps[1].address().to_string(), "/host=secondary/server-config=server-two");
        assert_eq!(steps[2].address().to_string(), "/server-group=main-server-group");
        assert!(steps.iter().all(|step| step.name() == "remove"));
        assert_eq!(plan.servers.len(), 2);
        assert!(plan.verification.is_none());
    }

    #[test]
    fn test_copy_group_adds_children_two_levels_deep() {
        let snapshot = json!({
            "profile": "full",
            "socket-binding-group": "full-sockets",
            "jvm": {"default": {"heap-size": "64m", "max-heap-size": "512m"}},
            "system-property": {"foo": {"value": "bar", "boot-time": true}},
            "deployment": null,
        });
        let plan = planner()
            .copy_server_group(&group(), &snapshot, "main-server-group_copy")
            .unwrap();

        let steps = composite(&plan).steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].name(), "add");
        assert_eq!(steps[0].address().to_string(), "/server-group=main-server-group_copy");
        assert_eq!(steps[0].parameter("profile"), Some(&json!("full")));
        assert!(steps[0].parameter("jvm").is_none());

        let addresses: Vec<String> = steps[1..].iter().map(|s| s.address().to_string()).collect();
        assert!(addresses.contains(&"/server-group=main-server-group_copy/jvm=default".to_string()));
        assert!(addresses
            .contains(&"/server-group=main-server-group_copy/system-property=foo".to_string()));
        assert_eq!(plan.messages.success, "Server group main-server-group_copy successfully added.");
    }

    #[test]
    fn test_copy_depth_is_bounded() {
        let snapshot = json!({
            "a": {"one": {"b": {"two": {"c": {"three": {"x": 1}}}}}},
        });
        let mut composite = Composite::new();
        add_child_operations(&mut composite, &snapshot, &ResourceAddress::of("server-group", "g"), 2);
        assert_eq!(composite.len(), 2);
        assert_eq!(
            composite.steps()[1].address().to_string(),
            "/server-group=g/a=one/b=two"
        );
    }

    #[test]
    fn test_copy_group_rejects_bad_names() {
        let err = planner()
            .copy_server_group(&group(), &json!({}), "a/b")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    #[test]
    fn test_server_start_reads_boot_errors() {
        let server = stopped("primary", "server-one");
        let plan = planner()
            .server(&server, ActionKind::Start, ActionOptions::default())
            .unwrap();
        let operation = single(&plan);
        assert_eq!(operation.name(), "start");
        assert_eq!(operation.address().to_string(), "/host=primary/server-config=server-one");
        assert_eq!(plan.verification.as_ref().unwrap().timeout, Duration::from_secs(15));
        assert_eq!(plan.follow_up, FollowUp::ReadBootErrors(server));
    }

    #[test]
    fn test_server_stop_refreshes_snapshot() {
        let server = started("primary", "server-one");
        let plan = planner()
            .server(&server, ActionKind::Stop, ActionOptions::suspend_timeout(5))
            .unwrap();
        assert_eq!(plan.verification.as_ref().unwrap().timeout, Duration::from_secs(5 + 4));
        assert_eq!(plan.follow_up, FollowUp::RefreshServer(server));
    }

    #[test]
    fn test_server_suspend_reads_runtime_resource() {
        let server = started("primary", "server-one");
        let plan = planner()
            .server(&server, ActionKind::Suspend, ActionOptions::suspend_timeout(10))
            .unwrap();
        match &plan.verification.as_ref().unwrap().read {
            PollRead::Single(read) => {
                assert_eq!(read.address().to_string(), "/host=primary/server=server-one");
                assert_eq!(read.parameter("name"), Some(&json!("suspend-state")));
            }
            other => panic!("unexpected read {:?}", other),
        }
        assert_eq!(plan.follow_up, FollowUp::None);
    }

    #[test]
    fn test_suspend_needs_management_support() {
        let server = started("primary", "server-one").with_management_version(Version::new(2, 1, 0));
        let err = planner()
            .server(&server, ActionKind::Suspend, ActionOptions::default())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unsupported(_)));
    }

    #[test]
    fn test_standalone_restart_pings_root() {
        let plan = planner()
            .server(&Server::standalone(), ActionKind::Restart, ActionOptions::default())
            .unwrap();
        let operation = single(&plan);
        assert_eq!(operation.name(), "shutdown");
        assert!(operation.address().is_root());
        assert_eq!(operation.parameter("restart"), Some(&json!(true)));

        let verification = plan.verification.as_ref().unwrap();
        assert!(verification.tolerate_transport_errors);
        assert_eq!(verification.timeout, Duration::from_secs(19));

        let err = planner()
            .server(&Server::standalone(), ActionKind::Stop, ActionOptions::default())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unsupported(_)));
    }

    #[test]
    fn test_remove_server_requires_stopped() {
        let err = planner().remove_server(&started("primary", "server-one")).unwrap_err();
        assert!(matches!(err, LifecycleError::Precondition(_)));

        let plan = planner().remove_server(&stopped("primary", "server-one")).unwrap();
        assert_eq!(single(&plan).name(), "remove");
        assert!(plan.verification.is_none());
    }

    #[test]
    fn test_copy_server_adds_known_children() {
        let source = started("primary", "server-one").with_group("main-server-group");
        let snapshot = json!({
            "name": "server-one",
            "group": "main-server-group",
            "auto-start": true,
            "jvm": {"default": {"heap-size": "64m"}},
            "path": {"tmp": {"path": "/tmp"}},
            "deployment-overlay": {"ignored": {"x": 1}},
        });
        let target = ServerCopy {
            host: "secondary".to_string(),
            name: "server-copy".to_string(),
            group: None,
            port_offset: Some(250),
        };
        let plan = planner().copy_server(&source, &snapshot, &target).unwrap();

        let steps = composite(&plan).steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].address().to_string(), "/host=secondary/server-config=server-copy");
        assert_eq!(steps[0].parameter("name"), Some(&json!("server-copy")));
        assert_eq!(steps[0].parameter("group"), Some(&json!("main-server-group")));
        assert_eq!(steps[0].parameter("socket-binding-port-offset"), Some(&json!(250)));
        assert_eq!(
            steps[1].address().to_string(),
            "/host=secondary/server-config=server-copy/jvm=default"
        );
        assert_eq!(
            steps[2].address().to_string(),
            "/host=secondary/server-config=server-copy/path=tmp"
        );
    }

    #[test]
    fn test_host_reload_without_restarting_servers() {
        let host = Host::new("secondary").with_servers(vec![
            started("secondary", "server-one"),
            stopped("secondary", "server-two"),
        ]);
        let plan = planner()
            .host(&host, ActionKind::Reload, ActionOptions::restart_servers(false))
            .unwrap();
        assert_eq!(single(&plan).parameter("restart-servers"), Some(&json!(false)));
        assert!(plan.servers.is_empty());

        let verification = plan.verification.as_ref().unwrap();
        assert!(verification.tolerate_transport_errors);
        assert_eq!(verification.timeout, Duration::from_secs(29));
        match &verification.read {
            PollRead::Composite(ping) => {
                assert_eq!(ping.len(), 2);
                assert_eq!(ping.steps()[1].address().to_string(), "/host=secondary/server=server-one");
            }
            other => panic!("unexpected ping {:?}", other),
        }
    }

    #[test]
    fn test_domain_controller_restart() {
        let host = Host::new("primary")
            .with_domain_controller(true)
            .with_servers(vec![stopped("primary", "server-one")]);
        let plan = planner()
            .host(&host, ActionKind::Restart, ActionOptions::default())
            .unwrap();
        assert_eq!(single(&plan).name(), "shutdown");
        assert_eq!(plan.servers.len(), 1);
        assert!(plan.messages.pending.is_some());
        assert_eq!(plan.messages.success, "Domain controller primary successfully restarted.");
        assert!(matches!(
            plan.verification.as_ref().unwrap().read,
            PollRead::Single(_)
        ));

        let err = planner()
            .host(&host, ActionKind::Suspend, ActionOptions::default())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unsupported(_)));
    }
}
