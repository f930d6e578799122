use hal_core::{ActionKind, Message, Server};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::refuse;
use crate::features::lifecycle::plan::{ActionOptions, EntityLabel, Planner, ServerCopy};
use crate::features::lifecycle::service::LifecycleOrchestrator;
use crate::shared::error::{LifecycleError, LifecycleResult};
use crate::shared::types::{ActionOutcome, ActionPlan, MessageTemplates};

/// Lifecycle actions on single servers, managed or standalone.
#[derive(Clone)]
pub struct ServerActions {
    orchestrator: LifecycleOrchestrator,
    planner: Planner,
}

impl ServerActions {
    pub fn new(orchestrator: LifecycleOrchestrator, planner: Planner) -> Self {
        Self {
            orchestrator,
            planner,
        }
    }

    fn plan(
        &self,
        server: &Server,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionPlan> {
        info!(host = %server.host, server = %server.name, action = %action, "Received server action");
        self.planner
            .server(server, action, options)
            .map_err(|e| refuse(self.orchestrator.events(), e))
    }

    async fn run(
        &self,
        server: &Server,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<ActionOutcome> {
        let plan = self.plan(server, action, options)?;
        Ok(self.orchestrator.run(plan).await)
    }

    /// Start the action in the background. The server is pending when this returns.
    pub fn spawn(
        &self,
        server: &Server,
        action: ActionKind,
        options: ActionOptions,
    ) -> LifecycleResult<JoinHandle<ActionOutcome>> {
        let plan = self.plan(server, action, options)?;
        Ok(self.orchestrator.spawn(plan))
    }

    pub async fn reload(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Reload, ActionOptions::default())
            .await
    }

    pub async fn restart(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Restart, ActionOptions::default())
            .await
    }

    pub async fn suspend(
        &self,
        server: &Server,
        suspend_timeout: u64,
    ) -> LifecycleResult<ActionOutcome> {
        self.run(
            server,
            ActionKind::Suspend,
            ActionOptions::suspend_timeout(suspend_timeout),
        )
        .await
    }

    pub async fn resume(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Resume, ActionOptions::default())
            .await
    }

    /// Graceful stop, waiting up to `suspend_timeout` seconds for requests to finish.
    pub async fn stop(&self, server: &Server, suspend_timeout: u64) -> LifecycleResult<ActionOutcome> {
        self.run(
            server,
            ActionKind::Stop,
            ActionOptions::suspend_timeout(suspend_timeout),
        )
        .await
    }

    pub async fn stop_now(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.stop(server, 0).await
    }

    pub async fn start(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Start, ActionOptions::default())
            .await
    }

    pub async fn start_in_suspended_mode(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Start, ActionOptions::start_suspended())
            .await
    }

    pub async fn destroy(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Destroy, ActionOptions::default())
            .await
    }

    pub async fn kill(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Kill, ActionOptions::default())
            .await
    }

    pub async fn remove(&self, server: &Server) -> LifecycleResult<ActionOutcome> {
        self.run(server, ActionKind::Remove, ActionOptions::default())
            .await
    }

    /// Copy the server config of `source` to a new server.
    pub async fn copy(&self, source: &Server, target: &ServerCopy) -> LifecycleResult<ActionOutcome> {
        info!(
            host = %source.host,
            server = %source.name,
            target_host = %target.host,
            target = %target.name,
            "Received server copy"
        );
        if source.standalone {
            return Err(refuse(
                self.orchestrator.events(),
                LifecycleError::Unsupported("a standalone server cannot be copied".to_string()),
            ));
        }
        let read = Planner::read_for_copy(source.server_config_address());
        let snapshot = match self.orchestrator.dispatcher().execute(&read).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(error = %error, "Could not read server config for copy");
                let templates =
                    MessageTemplates::for_action(EntityLabel::Server, &target.name, ActionKind::Copy);
                self.orchestrator
                    .events()
                    .message(Message::error(templates.error).with_details(error.description()));
                return Err(LifecycleError::Dispatch(error));
            }
        };
        let plan = self
            .planner
            .copy_server(source, &snapshot, target)
            .map_err(|e| refuse(self.orchestrator.events(), e))?;
        Ok(self.orchestrator.run(plan).await)
    }

    pub fn is_pending(&self, server: &Server) -> bool {
        self.orchestrator.is_pending(&server.key())
    }
}
