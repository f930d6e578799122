use hal_core::{ActionKind, ActionResult, Entity, EntityKey, Message, Server};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::shared::config::DEFAULT_EVENT_CAPACITY;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ActionStarted {
        action_id: Uuid,
        entity: Entity,
        servers: Vec<Server>,
        action: ActionKind,
    },
    ActionFinished {
        action_id: Uuid,
        entity: Entity,
        servers: Vec<Server>,
        action: ActionKind,
        result: ActionResult,
    },
    Message(Message),
}

impl LifecycleEvent {
    pub fn entity_key(&self) -> Option<EntityKey> {
        match self {
            LifecycleEvent::ActionStarted { entity, .. }
            | LifecycleEvent::ActionFinished { entity, .. } => Some(entity.key()),
            LifecycleEvent::Message(_) => None,
        }
    }

    pub fn result(&self) -> Option<ActionResult> {
        match self {
            LifecycleEvent::ActionFinished { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Fan-out of lifecycle events to any number of listeners.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of listeners reached. No listener is not an error.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Lifecycle event dropped, no subscribers");
                0
            }
        }
    }

    pub fn message(&self, message: Message) -> usize {
        self.publish(LifecycleEvent::Message(message))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn recorder(&self) -> EventRecorder {
        EventRecorder::new(self.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Collects everything published on a bus since it was created.
pub struct EventRecorder {
    receiver: broadcast::Receiver<LifecycleEvent>,
    events: Vec<LifecycleEvent>,
}

impl EventRecorder {
    pub fn new(receiver: broadcast::Receiver<LifecycleEvent>) -> Self {
        Self {
            receiver,
            events: Vec::new(),
        }
    }

    /// Pull every event available right now.
    pub fn drain(&mut self) -> &[LifecycleEvent] {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => self.events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event recorder lagged behind");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        &self.events
    }

    pub fn events(&mut self) -> Vec<LifecycleEvent> {
        self.drain().to_vec()
    }

    pub fn finished(&mut self) -> Vec<(EntityKey, ActionResult)> {
        self.drain()
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::ActionFinished { entity, result, .. } => {
                    Some((entity.key(), *result))
                }
                _ => None,
            })
            .collect()
    }

    pub fn messages(&mut self) -> Vec<Message> {
        self.drain()
            .iter()
            .filter_map(|event| match event {
                LifecycleEvent::Message(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal_core::{MessageLevel, ServerGroup};

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.message(Message::info("nobody listens")), 0);
    }

    #[test]
    fn test_recorder_keeps_publication_order() {
        let bus = EventBus::new(16);
        let mut recorder = bus.recorder();
        let group: Entity = ServerGroup::new("main-server-group").into();
        let action_id = Uuid::new_v4();

        bus.publish(LifecycleEvent::ActionStarted {
            action_id,
            entity: group.clone(),
            servers: vec![],
            action: ActionKind::Reload,
        });
        bus.publish(LifecycleEvent::ActionFinished {
            action_id,
            entity: group,
            servers: vec![],
            action: ActionKind::Reload,
            result: ActionResult::Success,
        });
        bus.message(Message::success("done"));

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], LifecycleEvent::ActionStarted { .. }));
        assert_eq!(events[1].result(), Some(ActionResult::Success));
        assert_eq!(
            recorder.finished(),
            vec![(
                EntityKey::ServerGroup("main-server-group".to_string()),
                ActionResult::Success
            )]
        );
        assert_eq!(recorder.messages()[0].level, MessageLevel::Success);
    }

    #[test]
    fn test_lagging_recorder_keeps_newest_events() {
        let bus = EventBus::new(2);
        let mut recorder = bus.recorder();
        for i in 0..5 {
            bus.message(Message::info(format!("message {}", i)));
        }
        let texts: Vec<String> = recorder.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["message 3", "message 4"]);
    }
}
