use hal_core::dmr::names;
use hal_core::{ActionResult, Entity, EntityKey, Message, ModelNode, Operation, Server};
use hal_dispatch::{DispatchError, Dispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::features::pending_state::repo::{PendingRegistry, Ticket};
use crate::features::polling::service::{PollError, PollOutcome, Poller};
use crate::shared::events::{EventBus, LifecycleEvent};
use crate::shared::types::{ActionOutcome, ActionPlan, Command, FollowUp};

/// Where a running action currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PendingDispatch,
    PendingVerify,
    Done,
}

/// An action that has been marked pending and announced.
struct PreparedAction {
    action_id: Uuid,
    ticket: Ticket,
    server_tickets: Vec<(EntityKey, Ticket)>,
    plan: ActionPlan,
    span: Span,
}

/// Terminal state of an action that was not superseded.
struct Terminal {
    result: ActionResult,
    message: Message,
    entity: Entity,
}

impl Terminal {
    fn success(plan: &ActionPlan, entity: Entity) -> Self {
        Self {
            result: ActionResult::Success,
            message: Message::success(plan.messages.success.clone()),
            entity,
        }
    }

    fn error(plan: &ActionPlan, error: &DispatchError) -> Self {
        Self {
            result: ActionResult::Error,
            message: Message::error(plan.messages.error.clone()).with_details(error.description()),
            entity: plan.entity.clone(),
        }
    }

    fn timeout(plan: &ActionPlan) -> Self {
        Self {
            result: ActionResult::Timeout,
            message: Message::warning(plan.messages.timeout.clone()),
            entity: plan.entity.clone(),
        }
    }
}

/// Runs lifecycle actions: prepare, dispatch, verify, finish.
///
/// Every action ends in exactly one `ActionFinished` event and one message,
/// unless a later action on the same entity superseded it. In that case the
/// late result is dropped without touching the registry or the bus.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    dispatcher: Arc<dyn Dispatcher>,
    registry: PendingRegistry,
    events: EventBus,
    poller: Poller,
}

impl LifecycleOrchestrator {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        registry: PendingRegistry,
        events: EventBus,
        poll_interval: Duration,
    ) -> Self {
        let poller = Poller::new(dispatcher.clone(), poll_interval);
        Self {
            dispatcher,
            registry,
            events,
            poller,
        }
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn is_pending(&self, key: &EntityKey) -> bool {
        self.registry.is_pending(key)
    }

    /// Run `plan` to its terminal result.
    pub async fn run(&self, plan: ActionPlan) -> ActionOutcome {
        let prepared = self.prepare(plan);
        self.complete(prepared).await
    }

    /// Prepare `plan` right away and run the rest in the background. The
    /// entity is pending and `ActionStarted` published when this returns.
    pub fn spawn(&self, plan: ActionPlan) -> JoinHandle<ActionOutcome> {
        let prepared = self.prepare(plan);
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.complete(prepared).await })
    }

    fn prepare(&self, plan: ActionPlan) -> PreparedAction {
        let action_id = Uuid::new_v4();
        let key = plan.entity.key();
        let span = info_span!(
            "lifecycle_action",
            action_id = %action_id,
            entity = %key,
            action = %plan.action
        );
        let entered = span.enter();

        // pending before the event, the event before the command
        let ticket = self.registry.mark_pending(plan.entity.clone());
        let server_tickets = plan
            .servers
            .iter()
            .map(|server| (server.key(), self.registry.mark_pending(server.clone())))
            .collect();
        self.events.publish(LifecycleEvent::ActionStarted {
            action_id,
            entity: plan.entity.clone(),
            servers: plan.servers.clone(),
            action: plan.action,
        });
        if let Some(pending) = &plan.messages.pending {
            self.events.message(Message::info(pending.clone()));
        }
        info!(servers = plan.servers.len(), "Lifecycle action started");

        drop(entered);
        PreparedAction {
            action_id,
            ticket,
            server_tickets,
            plan,
            span,
        }
    }

    async fn complete(&self, prepared: PreparedAction) -> ActionOutcome {
        let span = prepared.span.clone();
        async move {
            let terminal = self.execute(&prepared.plan, prepared.ticket).await;
            self.finish(prepared, terminal)
        }
        .instrument(span)
        .await
    }

    /// `None` when the action was superseded while verifying.
    async fn execute(&self, plan: &ActionPlan, ticket: Ticket) -> Option<Terminal> {
        debug!(phase = ?Phase::PendingDispatch, "Dispatching command");
        if let Err(error) = self.dispatch(&plan.command).await {
            warn!(error = %error, "Command rejected");
            return Some(Terminal::error(plan, &error));
        }

        if let Some(verification) = &plan.verification {
            debug!(
                phase = ?Phase::PendingVerify,
                timeout_ms = verification.timeout.as_millis() as u64,
                "Verifying command"
            );
            let key = plan.entity.key();
            let outcome = self
                .poller
                .poll_until(verification, || !self.registry.is_current(&key, ticket))
                .await;
            match outcome {
                Ok(PollOutcome::Satisfied) => {}
                Ok(PollOutcome::TimedOut) => return Some(Terminal::timeout(plan)),
                Ok(PollOutcome::Cancelled) => return None,
                Err(PollError::Dispatch(error)) => return Some(Terminal::error(plan, &error)),
            }
        }

        Some(self.follow_up(plan).await)
    }

    async fn dispatch(&self, command: &Command) -> Result<(), DispatchError> {
        match command {
            Command::Single(operation) => {
                info!(%operation, "Executing operation");
                self.dispatcher.execute(operation).await.map(|_| ())
            }
            Command::Composite(composite) => {
                info!(steps = composite.len(), "Executing composite");
                self.dispatcher.execute_composite(composite).await.map(|_| ())
            }
        }
    }

    async fn follow_up(&self, plan: &ActionPlan) -> Terminal {
        match &plan.follow_up {
            FollowUp::None => Terminal::success(plan, plan.entity.clone()),
            FollowUp::ReadBootErrors(server) => self.check_boot_errors(plan, server).await,
            FollowUp::RefreshServer(server) => {
                let read = Operation::new(server.server_config_address(), names::READ_RESOURCE)
                    .param(names::INCLUDE_RUNTIME, true);
                match self.dispatcher.execute(&read).await {
                    Ok(model) => {
                        let fresh = server.clone().with_runtime_attributes(&model);
                        Terminal::success(plan, Entity::Server(fresh))
                    }
                    Err(error) => {
                        warn!(error = %error, "Could not refresh server after stop");
                        Terminal::success(plan, plan.entity.clone())
                    }
                }
            }
        }
    }

    async fn check_boot_errors(&self, plan: &ActionPlan, server: &Server) -> Terminal {
        let read = Operation::new(
            server
                .server_address()
                .add(names::CORE_SERVICE, names::MANAGEMENT),
            names::READ_BOOT_ERRORS,
        );
        match self.dispatcher.execute(&read).await {
            Ok(errors) if has_boot_errors(&errors) => {
                warn!(server = %server.name, "Server booted with errors");
                let mut failed = server.clone();
                failed.boot_errors = true;
                Terminal {
                    result: ActionResult::Error,
                    message: Message::error(format!(
                        "Server {} booted with errors.",
                        server.name
                    ))
                    .with_details(errors.to_string()),
                    entity: Entity::Server(failed),
                }
            }
            Ok(_) => Terminal::success(plan, plan.entity.clone()),
            Err(error) => Terminal::error(plan, &error),
        }
    }

    fn finish(&self, prepared: PreparedAction, terminal: Option<Terminal>) -> ActionOutcome {
        let PreparedAction {
            action_id,
            ticket,
            server_tickets,
            plan,
            ..
        } = prepared;
        let key = plan.entity.key();

        // servers re-marked by a later action stay pending
        for (server, server_ticket) in &server_tickets {
            self.registry.release(server, *server_ticket);
        }

        let terminal = match terminal {
            Some(terminal) if self.registry.release(&key, ticket) => terminal,
            _ => {
                info!("Lifecycle action superseded, result dropped");
                return ActionOutcome::superseded(action_id, plan.entity);
            }
        };

        self.events.publish(LifecycleEvent::ActionFinished {
            action_id,
            entity: terminal.entity.clone(),
            servers: plan.servers,
            action: plan.action,
            result: terminal.result,
        });
        self.events.message(terminal.message.clone());
        info!(phase = ?Phase::Done, result = %terminal.result, "Lifecycle action finished");

        ActionOutcome::new(
            action_id,
            terminal.entity,
            Some(terminal.result),
            Some(terminal.message),
        )
    }
}

fn has_boot_errors(errors: &ModelNode) -> bool {
    errors.as_array().map(|list| !list.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{MessageTemplates, PollRead, Verification};
    use crate::features::polling::service::config_status_in;
    use hal_core::{ActionKind, MessageLevel, ResourceAddress, ServerConfigStatus};
    use hal_dispatch::ScriptedDispatcher;
    use serde_json::json;

    fn server() -> Server {
        Server::new("primary", "server-one").with_config_status(ServerConfigStatus::Stopped)
    }

    fn messages() -> MessageTemplates {
        MessageTemplates {
            success: "Server server-one successfully started.".to_string(),
            error: "Could not start server server-one.".to_string(),
            timeout: "Timeout while waiting for server server-one.".to_string(),
            pending: None,
        }
    }

    fn start_plan(timeout: Duration) -> ActionPlan {
        let server = server();
        let start = Operation::new(server.server_config_address(), names::START);
        let read = Operation::new(server.server_config_address(), names::READ_ATTRIBUTE)
            .param(names::NAME, names::STATUS);
        ActionPlan::new(server.clone(), ActionKind::Start, start, messages()).verified_by(
            Verification::new(
                PollRead::Single(read),
                config_status_in(1, &[ServerConfigStatus::Started]),
                timeout,
            ),
        )
    }

    fn orchestrator(dispatcher: Arc<ScriptedDispatcher>) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(
            dispatcher,
            PendingRegistry::new(),
            EventBus::new(64),
            Duration::from_millis(500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_publishes_started_finished_and_message() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTING"))
            .respond(names::READ_ATTRIBUTE, json!("STARTED"));
        let orchestrator = orchestrator(dispatcher.clone());
        let mut recorder = orchestrator.events().recorder();

        let outcome = orchestrator.run(start_plan(Duration::from_secs(15))).await;

        assert!(outcome.is_success());
        assert!(!orchestrator.is_pending(&server().key()));
        assert!(!orchestrator.registry().lifecycle_action_in_progress());

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            LifecycleEvent::ActionStarted { action: ActionKind::Start, .. }
        ));
        assert_eq!(events[1].result(), Some(ActionResult::Success));
        match &events[2] {
            LifecycleEvent::Message(message) => {
                assert_eq!(message.level, MessageLevel::Success);
                assert_eq!(message.text, "Server server-one successfully started.");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(dispatcher.count(names::READ_ATTRIBUTE), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_command_skips_verification() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher.fail(names::START, "WFLYHC0085: server already started");
        let orchestrator = orchestrator(dispatcher.clone());
        let mut recorder = orchestrator.events().recorder();

        let outcome = orchestrator.run(start_plan(Duration::from_secs(15))).await;

        assert_eq!(outcome.result, Some(ActionResult::Error));
        let message = outcome.message.unwrap();
        assert_eq!(message.details.as_deref(), Some("WFLYHC0085: server already started"));
        assert_eq!(dispatcher.count(names::READ_ATTRIBUTE), 0);
        assert!(!orchestrator.is_pending(&server().key()));
        assert_eq!(
            recorder.finished(),
            vec![(server().key(), ActionResult::Error)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_error() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTING"));
        let orchestrator = orchestrator(dispatcher);

        let outcome = orchestrator.run(start_plan(Duration::from_secs(3))).await;

        assert_eq!(outcome.result, Some(ActionResult::Timeout));
        assert_eq!(outcome.message.unwrap().level, MessageLevel::Warning);
        assert!(!orchestrator.is_pending(&server().key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_errors_turn_success_into_error() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTED"))
            .respond(
                names::READ_BOOT_ERRORS,
                json!([{"failed-operation": {"operation": "add"}, "failure-description": "WFLYCTL0212"}]),
            );
        let orchestrator = orchestrator(dispatcher.clone());

        let plan = start_plan(Duration::from_secs(15)).with_follow_up(FollowUp::ReadBootErrors(server()));
        let outcome = orchestrator.run(plan).await;

        assert_eq!(outcome.result, Some(ActionResult::Error));
        match outcome.entity {
            Entity::Server(server) => assert!(server.boot_errors),
            other => panic!("unexpected entity {:?}", other),
        }
        let read = &dispatcher.executed()[2];
        assert_eq!(read.name(), names::READ_BOOT_ERRORS);
        assert_eq!(
            read.address().to_string(),
            "/host=primary/server=server-one/core-service=management"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_boot_errors_keep_success() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTED"))
            .respond(names::READ_BOOT_ERRORS, json!([]));
        let orchestrator = orchestrator(dispatcher);

        let plan = start_plan(Duration::from_secs(15)).with_follow_up(FollowUp::ReadBootErrors(server()));
        assert!(orchestrator.run(plan).await.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_publishes_refreshed_server() {
        let running = server().with_config_status(ServerConfigStatus::Started);
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::STOP, json!(null))
            .respond(names::READ_RESOURCE, json!({"name": "server-one", "status": "STOPPED"}));
        let orchestrator = orchestrator(dispatcher);

        let plan = ActionPlan::new(
            running.clone(),
            ActionKind::Stop,
            Operation::new(running.server_config_address(), names::STOP),
            messages(),
        )
        .with_follow_up(FollowUp::RefreshServer(running));
        let outcome = orchestrator.run(plan).await;

        assert!(outcome.is_success());
        match outcome.entity {
            Entity::Server(server) => assert!(server.is_stopped()),
            other => panic!("unexpected entity {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_marks_pending_before_returning() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTED"));
        let orchestrator = orchestrator(dispatcher.clone());
        let mut recorder = orchestrator.events().recorder();

        let handle = orchestrator.spawn(start_plan(Duration::from_secs(15)));
        assert!(orchestrator.is_pending(&server().key()));
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(dispatcher.count(names::START), 0);

        let outcome = handle.await.unwrap();
        assert!(outcome.is_success());
        assert!(!orchestrator.is_pending(&server().key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_message_follows_start_event() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher.respond(names::RELOAD, json!(null));
        let orchestrator = orchestrator(dispatcher);
        let mut recorder = orchestrator.events().recorder();

        let mut templates = messages();
        templates.pending = Some("Domain controller primary is being reloaded.".to_string());
        let plan = ActionPlan::new(
            hal_core::Host::new("primary"),
            ActionKind::Reload,
            Operation::new(ResourceAddress::of(names::HOST, "primary"), names::RELOAD),
            templates,
        );
        orchestrator.run(plan).await;

        let events = recorder.events();
        assert_eq!(events.len(), 4);
        match &events[1] {
            LifecycleEvent::Message(message) => assert_eq!(message.level, MessageLevel::Info),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_is_sent_before_first_read() {
        let mut sequence = mockall::Sequence::new();
        let mut dispatcher = hal_dispatch::MockDispatcher::new();
        dispatcher
            .expect_execute()
            .withf(|operation| operation.name() == names::START)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(json!(null)));
        dispatcher
            .expect_execute()
            .withf(|operation| operation.name() == names::READ_ATTRIBUTE)
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(json!("STARTED")));
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(dispatcher),
            PendingRegistry::new(),
            EventBus::new(8),
            Duration::from_millis(500),
        );

        let outcome = orchestrator.run(start_plan(Duration::from_secs(15))).await;
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_action_supersedes_earlier_one() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        dispatcher
            .respond(names::START, json!(null))
            .respond(names::READ_ATTRIBUTE, json!("STARTED"));
        let orchestrator = orchestrator(dispatcher);
        let mut recorder = orchestrator.events().recorder();

        let first = orchestrator.spawn(start_plan(Duration::from_secs(15)));
        let second = orchestrator.spawn(start_plan(Duration::from_secs(15)));
        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert!(first.is_superseded());
        assert!(second.is_success());
        assert!(orchestrator.registry().is_empty());
        assert_eq!(recorder.finished().len(), 1);
        assert_eq!(recorder.messages().len(), 1);
    }

    #[test]
    fn test_boot_error_detection() {
        assert!(!has_boot_errors(&json!([])));
        assert!(!has_boot_errors(&json!(null)));
        assert!(has_boot_errors(&json!([{"failure-description": "x"}])));
    }
}
