use hal_core::{ActionKind, Host};
use tokio::task::JoinHandle;
use tracing::info;

use super::refuse;
use crate::features::lifecycle::plan::{ActionOptions, Planner};
use crate::features::lifecycle::service::LifecycleOrchestrator;
use crate::shared::error::LifecycleResult;
use crate::shared::types::{ActionOutcome, ActionPlan};

/// Reload and restart of hosts, including the domain controller.
#[derive(Clone)]
pub struct HostActions {
    orchestrator: LifecycleOrchestrator,
    planner: Planner,
}

impl HostActions {
    pub fn new(orchestrator: LifecycleOrchestrator, planner: Planner) -> Self {
        Self {
            orchestrator,
            planner,
        }
    }

    fn plan(&self, host: &Host, action: ActionKind, options: ActionOptions) -> LifecycleResult<ActionPlan> {
        info!(
            host = %host.name,
            action = %action,
            domain_controller = host.domain_controller,
            "Received host action"
        );
        self.planner
            .host(host, action, options)
            .map_err(|e| refuse(self.orchestrator.events(), e))
    }

    /// Reload the host controller. With `restart_servers` its started servers restart too.
    pub async fn reload(&self, host: &Host, restart_servers: bool) -> LifecycleResult<ActionOutcome> {
        let plan = self.plan(host, ActionKind::Reload, ActionOptions::restart_servers(restart_servers))?;
        Ok(self.orchestrator.run(plan).await)
    }

    pub async fn restart(&self, host: &Host) -> LifecycleResult<ActionOutcome> {
        let plan = self.plan(host, ActionKind::Restart, ActionOptions::default())?;
        Ok(self.orchestrator.run(plan).await)
    }

    /// Start the action in the background. The host is pending when this returns.
    pub fn spawn(
        &self,
        host: &Host,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<JoinHandle<ActionOutcome>> {
        let plan = self.plan(host, action, options)?;
        Ok(self.orchestrator.spawn(plan))
    }

    pub fn is_pending(&self, host: &Host) -> bool {
        self.orchestrator.is_pending(&host.key())
    }
}
