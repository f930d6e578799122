use hal_core::{ActionKind, Message, ServerGroup};
use tracing::{info, warn};

use super::refuse;
use crate::features::lifecycle::plan::{ActionOptions, EntityLabel, Planner};
use crate::features::lifecycle::service::LifecycleOrchestrator;
use crate::shared::error::{LifecycleError, LifecycleResult};
use crate::shared::types::{ActionOutcome, MessageTemplates};

/// Lifecycle actions on server groups
#[derive(Clone)]
pub struct ServerGroupActions {
    orchestrator: LifecycleOrchestrator,
    planner: Planner,
}

impl ServerGroupActions {
    pub fn new(orchestrator: LifecycleOrchestrator, planner: Planner) -> Self {
        Self {
            orchestrator,
            planner,
        }
    }

    async fn run(
        &self,
        group: &ServerGroup,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionOutcome> {
        info!(server_group = %group.name, action = %action, "Received server group action");
        let plan = self
            .planner
            .server_group(group, action, options)
            .map_err(|e| refuse(self.orchestrator.events(), e))?;
        Ok(self.orchestrator.run(plan).await)
    }

    pub async fn reload(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Reload, ActionOptions::default())
            .await
    }

    pub async fn restart(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Restart, ActionOptions::default())
            .await
    }

    pub async fn suspend(
        &self,
        group: &ServerGroup,
        suspend_timeout: u64,
    ) -> LifecycleResult<ActionOutcome> {
        self.run(
            group,
            ActionKind::Suspend,
            ActionOptions::suspend_timeout(suspend_timeout),
        )
        .await
    }

    pub async fn resume(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Resume, ActionOptions::default())
            .await
    }

    pub async fn stop(
        &self,
        group: &ServerGroup,
        suspend_timeout: u64,
    ) -> LifecycleResult<ActionOutcome> {
        self.run(
            group,
            ActionKind::Stop,
            ActionOptions::suspend_timeout(suspend_timeout),
        )
        .await
    }

    pub async fn start(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Start, ActionOptions::default())
            .await
    }

    pub async fn start_in_suspended_mode(
        &self,
        group: &ServerGroup,
    ) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Start, ActionOptions::start_suspended())
            .await
    }

    pub async fn destroy(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Destroy, ActionOptions::default())
            .await
    }

    pub async fn kill(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        self.run(group, ActionKind::Kill, ActionOptions::default())
            .await
    }

    /// Remove the group together with its stopped servers.
    pub async fn remove(&self, group: &ServerGroup) -> LifecycleResult<ActionOutcome> {
        info!(server_group = %group.name, "Received server group remove");
        let plan = self.planner.remove_server_group(group);
        Ok(self.orchestrator.run(plan).await)
    }

    /// Copy the group and its nested resources under `new_name`.
    pub async fn copy(&self, group: &ServerGroup, new_name: &str) -> LifecycleResult<ActionOutcome> {
        info!(server_group = %group.name, new_name, "Received server group copy");
        let read = Planner::read_for_copy(group.address());
        let snapshot = match self.orchestrator.dispatcher().execute(&read).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "Could not read server group for copy");
                let templates =
                    MessageTemplates::for_action(EntityLabel::ServerGroup, new_name, ActionKind::Copy);
                self.orchestrator.events().message(
                    Message::error(templates.error).with_details(error.description()),
                );
                return Err(LifecycleError::Dispatch(error));
            }
        };
        let plan = self
            .planner
            .copy_server_group(group, &snapshot, new_name)
            .map_err(|e| refuse(self.orchestrator.events(), e))?;
        Ok(self.orchestrator.run(plan).await)
    }

    /// Default name offered for a copy.
    pub fn copy_name(group: &ServerGroup) -> String {
        format!("{}_copy", group.name)
    }

    pub fn is_pending(&self, group: &ServerGroup) -> bool {
        self.orchestrator.is_pending(&group.key())
    }
}
