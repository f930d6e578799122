//! Snapshots of servers, hosts and server groups read from the management model.

use hal_core::dmr::{self, names};
use hal_core::{Host, ModelNode, Operation, ResourceAddress, Server, ServerGroup};
use hal_dispatch::{DispatchError, Dispatcher};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::shared::error::{LifecycleError, LifecycleResult};

const WILDCARD: &str = "*";

/// Reads the entities a lifecycle action operates on.
#[derive(Clone)]
pub struct TopologyService {
    dispatcher: Arc<dyn Dispatcher>,
}

impl TopologyService {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    async fn read(&self, what: &str, operation: Operation) -> LifecycleResult<ModelNode> {
        self.dispatcher
            .execute(&operation)
            .await
            .map_err(|error| match error {
                DispatchError::Failure(description) => {
                    LifecycleError::NotFound(format!("{}: {}", what, description))
                }
                transport => LifecycleError::Dispatch(transport),
            })
    }

    /// Every server config of every host, with runtime attributes.
    async fn all_servers(&self) -> LifecycleResult<Vec<Server>> {
        let address = ResourceAddress::of(names::HOST, WILDCARD).add(names::SERVER_CONFIG, WILDCARD);
        let operation =
            Operation::new(address, names::READ_RESOURCE).param(names::INCLUDE_RUNTIME, true);
        let result = self.read("server configs", operation).await?;
        wildcard_servers(&result)
    }

    pub async fn server_group(&self, name: &str) -> LifecycleResult<ServerGroup> {
        let address = ResourceAddress::of(names::SERVER_GROUP, name);
        let model = self
            .read(
                &format!("server group {}", name),
                Operation::new(address, names::READ_RESOURCE),
            )
            .await?;
        let members: Vec<Server> = self
            .all_servers()
            .await?
            .into_iter()
            .filter(|server| server.server_group.as_deref() == Some(name))
            .collect();
        let runtime = ResourceAddress::of(names::HOST, WILDCARD).add(names::SERVER, WILDCARD);
        let servers = self.with_runtime(members, runtime).await;
        info!(server_group = name, servers = servers.len(), "Read server group");
        Ok(ServerGroup::from_model(name, &model).with_servers(servers))
    }

    pub async fn host(&self, name: &str) -> LifecycleResult<Host> {
        let address = ResourceAddress::of(names::HOST, name);
        let model = self
            .read(&format!("host {}", name), runtime_read(address.clone()))
            .await?;
        let configs = self
            .read(
                &format!("server configs of host {}", name),
                Operation::new(
                    address.clone().add(names::SERVER_CONFIG, WILDCARD),
                    names::READ_RESOURCE,
                )
                .param(names::INCLUDE_RUNTIME, true),
            )
            .await?;
        let servers = self
            .with_runtime(
                wildcard_servers(&configs)?,
                address.add(names::SERVER, WILDCARD),
            )
            .await;
        info!(host = name, servers = servers.len(), "Read host");
        Ok(Host::from_model(name, &model).with_servers(servers))
    }

    /// Server config of `host`/`name`, overlaid with the runtime resource while it runs.
    pub async fn server(&self, host: &str, name: &str) -> LifecycleResult<Server> {
        let config_address = ResourceAddress::of(names::HOST, host).add(names::SERVER_CONFIG, name);
        let model = self
            .read(
                &format!("server {}/{}", host, name),
                Operation::new(config_address, names::READ_RESOURCE)
                    .param(names::INCLUDE_RUNTIME, true),
            )
            .await?;
        let mut server = Server::from_model(host, &model);
        if server.name.is_empty() {
            server.name = name.to_string();
        }
        if !server.is_started() {
            return Ok(server);
        }

        match self.dispatcher.execute(&runtime_read(server.server_address())).await {
            Ok(model) => Ok(server.with_runtime_attributes(&model)),
            Err(error) => {
                debug!(host, server = name, error = %error, "Runtime resource not readable");
                Ok(server)
            }
        }
    }

    /// Overlay the runtime resources matched by `runtime` onto the started
    /// servers. Stopped servers have no runtime resource and keep their config.
    async fn with_runtime(&self, servers: Vec<Server>, runtime: ResourceAddress) -> Vec<Server> {
        if !servers.iter().any(Server::is_started) {
            return servers;
        }
        let result = match self.dispatcher.execute(&runtime_read(runtime)).await {
            Ok(result) => result,
            Err(error) => {
                debug!(error = %error, "Runtime resources not readable");
                return servers;
            }
        };
        let entries = match wildcard_entries(&result) {
            Ok(entries) => entries,
            Err(error) => {
                debug!(error = %error, "Unexpected runtime read result");
                return servers;
            }
        };
        servers
            .into_iter()
            .map(|server| {
                let model = entries
                    .iter()
                    .find(|(host, name, _)| *host == server.host && *name == server.name)
                    .map(|(_, _, model)| *model);
                match model {
                    Some(model) if server.is_started() => server.with_runtime_attributes(model),
                    _ => server,
                }
            })
            .collect()
    }

    pub async fn standalone_server(&self) -> LifecycleResult<Server> {
        let model = self
            .read("standalone server", runtime_read(ResourceAddress::root()))
            .await?;
        Ok(Server::standalone().with_runtime_attributes(&model))
    }
}

fn runtime_read(address: ResourceAddress) -> Operation {
    Operation::new(address, names::READ_RESOURCE)
        .param(names::ATTRIBUTES_ONLY, true)
        .param(names::INCLUDE_RUNTIME, true)
}

/// `(host, name, result)` of each successful entry of a `/host=*/<type>=*` read.
fn wildcard_entries(result: &ModelNode) -> LifecycleResult<Vec<(String, String, &ModelNode)>> {
    let entries = result.as_array().ok_or_else(|| {
        LifecycleError::Model(hal_core::CoreError::InvalidModel(
            "expected a list of wildcard results".to_string(),
        ))
    })?;

    let mut matched = Vec::with_capacity(entries.len());
    for entry in entries {
        if dmr::attribute_str(entry, names::OUTCOME) != Some(names::SUCCESS) {
            continue;
        }
        let address = ResourceAddress::from_model(entry.get("address").unwrap_or(&Value::Null))?;
        let host = address
            .segments()
            .iter()
            .find(|(resource_type, _)| resource_type == names::HOST)
            .map(|(_, name)| name.clone());
        let (Some(host), Some(name)) = (host, address.last_name()) else {
            continue;
        };
        let model = entry.get(names::RESULT).unwrap_or(&Value::Null);
        matched.push((host, name.to_string(), model));
    }
    Ok(matched)
}

/// Servers of a `/host=*/server-config=*` read. Failed entries are skipped.
fn wildcard_servers(result: &ModelNode) -> LifecycleResult<Vec<Server>> {
    Ok(wildcard_entries(result)?
        .into_iter()
        .map(|(host, name, model)| {
            let mut server = Server::from_model(host, model);
            server.name = name;
            server
        })
        .collect())
}
