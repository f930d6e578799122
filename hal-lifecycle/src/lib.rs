pub mod features;
pub mod shared;

use hal_dispatch::{Dispatcher, HttpDispatcher};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use features::lifecycle::controller::{HostActions, ServerActions, ServerGroupActions};
use features::lifecycle::plan::Planner;
use features::lifecycle::service::LifecycleOrchestrator;
use features::pending_state::repo::PendingRegistry;
use features::topology::service::TopologyService;
use shared::config::LifecycleConfig;
use shared::error::LifecycleResult;
use shared::events::{EventBus, EventRecorder, LifecycleEvent};

pub use features::lifecycle::plan::{ActionOptions, ServerCopy};
pub use shared::error::LifecycleError;
pub use shared::types::ActionOutcome;

/// Lifecycle actions sharing one dispatcher, pending registry and event bus.
#[derive(Clone)]
pub struct Lifecycle {
    orchestrator: LifecycleOrchestrator,
    planner: Planner,
    topology: TopologyService,
}

impl Lifecycle {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: LifecycleConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        let orchestrator = LifecycleOrchestrator::new(
            dispatcher.clone(),
            PendingRegistry::new(),
            events,
            config.poll_interval,
        );
        Self {
            orchestrator,
            topology: TopologyService::new(dispatcher),
            planner: Planner::new(config),
        }
    }

    /// Connect to the management endpoint named in `config`.
    pub fn connect(config: LifecycleConfig) -> LifecycleResult<Self> {
        let dispatcher = HttpDispatcher::new(config.dispatcher_config())?;
        info!(endpoint = dispatcher.endpoint(), "Connected lifecycle dispatcher");
        Ok(Self::new(Arc::new(dispatcher), config))
    }

    pub fn servers(&self) -> ServerActions {
        ServerActions::new(self.orchestrator.clone(), self.planner.clone())
    }

    pub fn hosts(&self) -> HostActions {
        HostActions::new(self.orchestrator.clone(), self.planner.clone())
    }

    pub fn server_groups(&self) -> ServerGroupActions {
        ServerGroupActions::new(self.orchestrator.clone(), self.planner.clone())
    }

    pub fn topology(&self) -> &TopologyService {
        &self.topology
    }

    pub fn registry(&self) -> &PendingRegistry {
        self.orchestrator.registry()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.orchestrator.events().subscribe()
    }

    pub fn recorder(&self) -> EventRecorder {
        self.orchestrator.events().recorder()
    }

    /// True while any entity is pending.
    pub fn lifecycle_action_in_progress(&self) -> bool {
        self.registry().lifecycle_action_in_progress()
    }
}
