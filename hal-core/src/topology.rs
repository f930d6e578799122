//! Servers, hosts and server groups as read from the management model.
//!
//! Entities are snapshots. They are rebuilt on every read and never mutated
//! to reflect remote state changes.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dmr::{attribute_str, names, ModelNode, ResourceAddress};

pub const STANDALONE_HOST: &str = "standalone-host";
pub const STANDALONE_SERVER: &str = "standalone-server";

fn normalize(value: &str) -> String {
    value.trim().to_ascii_uppercase().replace('-', "_")
}

/// `server-config.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerConfigStatus {
    Started,
    Starting,
    Stopped,
    Stopping,
    Disabled,
    Failed,
    Undefined,
}

impl ServerConfigStatus {
    pub fn parse(value: &str) -> Self {
        match normalize(value).as_str() {
            "STARTED" => Self::Started,
            "STARTING" => Self::Starting,
            "STOPPED" => Self::Stopped,
            "STOPPING" => Self::Stopping,
            "DISABLED" => Self::Disabled,
            "FAILED" => Self::Failed,
            _ => Self::Undefined,
        }
    }

    pub fn from_model(node: &ModelNode) -> Self {
        node.as_str().map(Self::parse).unwrap_or(Self::Undefined)
    }
}

/// `server.server-state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunningState {
    Starting,
    Running,
    RestartRequired,
    ReloadRequired,
    Stopping,
    Stopped,
    Undefined,
}

impl RunningState {
    pub fn parse(value: &str) -> Self {
        match normalize(value).as_str() {
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "RESTART_REQUIRED" => Self::RestartRequired,
            "RELOAD_REQUIRED" => Self::ReloadRequired,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            _ => Self::Undefined,
        }
    }

    pub fn from_model(node: &ModelNode) -> Self {
        node.as_str().map(Self::parse).unwrap_or(Self::Undefined)
    }
}

/// `server.suspend-state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspendState {
    Running,
    PreSuspend,
    Suspending,
    Suspended,
    Undefined,
}

impl SuspendState {
    pub fn parse(value: &str) -> Self {
        match normalize(value).as_str() {
            "RUNNING" => Self::Running,
            "PRE_SUSPEND" => Self::PreSuspend,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Undefined,
        }
    }

    pub fn from_model(node: &ModelNode) -> Self {
        node.as_str().map(Self::parse).unwrap_or(Self::Undefined)
    }
}

/// Management model version from which `suspend` and `resume` exist.
pub fn suspend_support_version() -> Version {
    Version::new(3, 0, 0)
}

/// Combination of the `server-config` and `server` resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub name: String,
    pub server_group: Option<String>,
    pub config_status: ServerConfigStatus,
    pub running_state: RunningState,
    pub suspend_state: SuspendState,
    pub standalone: bool,
    pub management_version: Option<Version>,
    pub boot_errors: bool,
}

impl Server {
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            server_group: None,
            config_status: ServerConfigStatus::Undefined,
            running_state: RunningState::Undefined,
            suspend_state: SuspendState::Undefined,
            standalone: false,
            management_version: None,
            boot_errors: false,
        }
    }

    /// The single server of a standalone installation.
    pub fn standalone() -> Self {
        Self {
            config_status: ServerConfigStatus::Started,
            running_state: RunningState::Running,
            standalone: true,
            ..Self::new(STANDALONE_HOST, STANDALONE_SERVER)
        }
    }

    /// Snapshot from a `server-config` read (optionally with runtime attributes).
    pub fn from_model(host: impl Into<String>, model: &ModelNode) -> Self {
        let name = attribute_str(model, names::NAME).unwrap_or_default();
        Self::new(host, name).with_runtime_attributes(model)
    }

    /// Overlay the attributes of the `server` resource onto this snapshot.
    pub fn with_runtime_attributes(mut self, model: &ModelNode) -> Self {
        if let Some(group) = attribute_str(model, names::GROUP)
            .or_else(|| attribute_str(model, names::SERVER_GROUP))
        {
            self.server_group = Some(group.to_string());
        }
        if let Some(status) = model.get(names::STATUS) {
            self.config_status = ServerConfigStatus::from_model(status);
        }
        if let Some(state) = model.get(names::SERVER_STATE) {
            self.running_state = RunningState::from_model(state);
        }
        if let Some(state) = model.get(names::SUSPEND_STATE) {
            self.suspend_state = SuspendState::from_model(state);
        }
        if let Some(version) = management_version(model) {
            self.management_version = Some(version);
        }
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.server_group = Some(group.into());
        self
    }

    pub fn with_config_status(mut self, status: ServerConfigStatus) -> Self {
        self.config_status = status;
        self
    }

    pub fn with_running_state(mut self, state: RunningState) -> Self {
        self.running_state = state;
        self
    }

    pub fn with_suspend_state(mut self, state: SuspendState) -> Self {
        self.suspend_state = state;
        self
    }

    pub fn with_management_version(mut self, version: Version) -> Self {
        self.management_version = Some(version);
        self
    }

    /// Safe to read runtime attributes.
    pub fn is_started(&self) -> bool {
        self.config_status == ServerConfigStatus::Started
            || self.running_state == RunningState::Running
    }

    pub fn is_starting(&self) -> bool {
        self.running_state == RunningState::Starting
    }

    pub fn is_running(&self) -> bool {
        self.running_state == RunningState::Running && !self.is_suspended()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_state == SuspendState::Suspended
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self.config_status,
            ServerConfigStatus::Stopped | ServerConfigStatus::Disabled
        )
    }

    /// Does not take boot errors into account.
    pub fn is_failed(&self) -> bool {
        self.config_status == ServerConfigStatus::Failed
    }

    pub fn needs_restart(&self) -> bool {
        self.running_state == RunningState::RestartRequired
    }

    pub fn needs_reload(&self) -> bool {
        self.running_state == RunningState::ReloadRequired
    }

    /// Unknown versions are assumed to support suspend.
    pub fn supports_suspend(&self) -> bool {
        self.management_version
            .as_ref()
            .map(|version| *version >= suspend_support_version())
            .unwrap_or(true)
    }

    pub fn server_config_address(&self) -> ResourceAddress {
        if self.standalone {
            ResourceAddress::root()
        } else {
            ResourceAddress::of(names::HOST, &self.host).add(names::SERVER_CONFIG, &self.name)
        }
    }

    pub fn server_address(&self) -> ResourceAddress {
        if self.standalone {
            ResourceAddress::root()
        } else {
            ResourceAddress::of(names::HOST, &self.host).add(names::SERVER, &self.name)
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::Server {
            host: self.host.clone(),
            server: self.name.clone(),
        }
    }
}

fn management_version(model: &ModelNode) -> Option<Version> {
    let part = |name: &str| model.get(name).and_then(serde_json::Value::as_u64);
    let major = part("management-major-version")?;
    Some(Version::new(
        major,
        part("management-minor-version").unwrap_or(0),
        part("management-micro-version").unwrap_or(0),
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub domain_controller: bool,
    pub servers: Vec<Server>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain_controller: false,
            servers: Vec::new(),
        }
    }

    /// Snapshot from a `/host=<name>:read-resource` result.
    pub fn from_model(name: impl Into<String>, model: &ModelNode) -> Self {
        let domain_controller = model
            .get("domain-controller")
            .map(|dc| dc.get("local").is_some())
            .unwrap_or(false);
        Self {
            domain_controller,
            ..Self::new(name)
        }
    }

    pub fn with_domain_controller(mut self, domain_controller: bool) -> Self {
        self.domain_controller = domain_controller;
        self
    }

    /// Attach servers, tagging each one with this host.
    pub fn with_servers(mut self, servers: impl IntoIterator<Item = Server>) -> Self {
        let host = self.name.clone();
        self.servers = servers
            .into_iter()
            .map(|mut server| {
                server.host = host.clone();
                server
            })
            .collect();
        self
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::of(names::HOST, &self.name)
    }

    pub fn servers_matching(&self, predicate: impl Fn(&Server) -> bool) -> Vec<Server> {
        self.servers.iter().filter(|s| predicate(*s)).cloned().collect()
    }

    pub fn has_servers(&self, predicate: impl Fn(&Server) -> bool) -> bool {
        self.servers.iter().any(predicate)
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::Host(self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerGroup {
    pub name: String,
    pub profile: Option<String>,
    pub socket_binding_group: Option<String>,
    pub servers: Vec<Server>,
}

impl ServerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile: None,
            socket_binding_group: None,
            servers: Vec::new(),
        }
    }

    pub fn from_model(name: impl Into<String>, model: &ModelNode) -> Self {
        Self {
            profile: attribute_str(model, "profile").map(str::to_string),
            socket_binding_group: attribute_str(model, "socket-binding-group")
                .map(str::to_string),
            ..Self::new(name)
        }
    }

    pub fn with_servers(mut self, servers: impl IntoIterator<Item = Server>) -> Self {
        let group = self.name.clone();
        self.servers = servers
            .into_iter()
            .map(|server| server.with_group(group.clone()))
            .collect();
        self
    }

    pub fn address(&self) -> ResourceAddress {
        ResourceAddress::of(names::SERVER_GROUP, &self.name)
    }

    pub fn servers_matching(&self, predicate: impl Fn(&Server) -> bool) -> Vec<Server> {
        self.servers.iter().filter(|s| predicate(*s)).cloned().collect()
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::ServerGroup(self.name.clone())
    }
}

/// Composite key identifying a manageable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EntityKey {
    Server { host: String, server: String },
    Host(String),
    ServerGroup(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Server { host, server } => write!(f, "server {}/{}", host, server),
            EntityKey::Host(name) => write!(f, "host {}", name),
            EntityKey::ServerGroup(name) => write!(f, "server-group {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entity", rename_all = "kebab-case")]
pub enum Entity {
    Server(Server),
    Host(Host),
    ServerGroup(ServerGroup),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Server(server) => server.key(),
            Entity::Host(host) => host.key(),
            Entity::ServerGroup(group) => group.key(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Server(server) => &server.name,
            Entity::Host(host) => &host.name,
            Entity::ServerGroup(group) => &group.name,
        }
    }
}

impl From<Server> for Entity {
    fn from(server: Server) -> Self {
        Entity::Server(server)
    }
}

impl From<Host> for Entity {
    fn from(host: Host) -> Self {
        Entity::Host(host)
    }
}

impl From<ServerGroup> for Entity {
    fn from(group: ServerGroup) -> Self {
        Entity::ServerGroup(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(ServerConfigStatus::parse("started"), ServerConfigStatus::Started);
        assert_eq!(ServerConfigStatus::parse("DISABLED"), ServerConfigStatus::Disabled);
        assert_eq!(ServerConfigStatus::parse("bogus"), ServerConfigStatus::Undefined);
        assert_eq!(RunningState::parse("reload-required"), RunningState::ReloadRequired);
        assert_eq!(SuspendState::parse("SUSPENDED"), SuspendState::Suspended);
        assert_eq!(
            ServerConfigStatus::from_model(&json!(42)),
            ServerConfigStatus::Undefined
        );
    }

    #[test]
    fn test_server_from_model() {
        let model = json!({
            "name": "server-one",
            "group": "main-server-group",
            "status": "STARTED",
            "server-state": "running",
            "suspend-state": "RUNNING",
            "management-major-version": 4,
            "management-minor-version": 1,
        });
        let server = Server::from_model("primary", &model);

        assert_eq!(server.name, "server-one");
        assert_eq!(server.host, "primary");
        assert_eq!(server.server_group.as_deref(), Some("main-server-group"));
        assert!(server.is_started());
        assert!(server.is_running());
        assert_eq!(server.management_version, Some(Version::new(4, 1, 0)));
        assert!(server.supports_suspend());
    }

    #[test]
    fn test_server_predicates() {
        let stopped = Server::new("primary", "s1").with_config_status(ServerConfigStatus::Stopped);
        let disabled = Server::new("primary", "s2").with_config_status(ServerConfigStatus::Disabled);
        let failed = Server::new("primary", "s3").with_config_status(ServerConfigStatus::Failed);
        let suspended = Server::new("primary", "s4")
            .with_config_status(ServerConfigStatus::Started)
            .with_running_state(RunningState::Running)
            .with_suspend_state(SuspendState::Suspended);

        assert!(stopped.is_stopped());
        assert!(disabled.is_stopped());
        assert!(failed.is_failed() && !failed.is_stopped());
        assert!(suspended.is_started() && suspended.is_suspended() && !suspended.is_running());
    }

    #[test]
    fn test_old_management_model_does_not_support_suspend() {
        let server = Server::new("primary", "s1").with_management_version(Version::new(2, 1, 0));
        assert!(!server.supports_suspend());
    }

    #[test]
    fn test_server_addresses() {
        let server = Server::new("primary", "server-one");
        assert_eq!(
            server.server_config_address().to_string(),
            "/host=primary/server-config=server-one"
        );
        assert_eq!(server.server_address().to_string(), "/host=primary/server=server-one");
        assert!(Server::standalone().server_config_address().is_root());
        assert!(Server::standalone().is_started());
    }

    #[test]
    fn test_host_tags_servers() {
        let host = Host::new("secondary").with_servers(vec![Server::new("elsewhere", "s1")]);
        assert_eq!(host.servers[0].host, "secondary");
        assert_eq!(host.address().to_string(), "/host=secondary");
    }

    #[test]
    fn test_host_domain_controller_from_model() {
        let primary = Host::from_model("primary", &json!({"domain-controller": {"local": {}}}));
        let secondary = Host::from_model(
            "secondary",
            &json!({"domain-controller": {"remote": {"host": "10.0.0.1"}}}),
        );
        assert!(primary.domain_controller);
        assert!(!secondary.domain_controller);
    }

    #[test]
    fn test_server_group_filters_servers() {
        let group = ServerGroup::new("main-server-group").with_servers(vec![
            Server::new("primary", "s1").with_config_status(ServerConfigStatus::Started),
            Server::new("primary", "s2").with_config_status(ServerConfigStatus::Stopped),
        ]);
        assert_eq!(group.servers_matching(Server::is_started).len(), 1);
        assert_eq!(group.servers[1].server_group.as_deref(), Some("main-server-group"));
    }

    #[test]
    fn test_entity_keys() {
        let entity: Entity = ServerGroup::new("main-server-group").into();
        assert_eq!(entity.key(), EntityKey::ServerGroup("main-server-group".to_string()));
        assert_eq!(entity.key().to_string(), "server-group main-server-group");
        assert_eq!(
            Server::new("primary", "s1").key().to_string(),
            "server primary/s1"
        );
    }
}
