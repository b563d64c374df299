//! Best-effort change notification.
//!
//! Delivery is not part of any correctness contract: notifiers never fail the
//! operation that triggered them.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kind of entity a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Assignment,
    Submission,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Assignment => f.write_str("assignment"),
            EntityType::Submission => f.write_str("submission"),
        }
    }
}

/// Emitted after a state-changing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub new_state: String,
}

impl ChangeEvent {
    pub fn new(entity_type: EntityType, entity_id: &str, new_state: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            new_state: new_state.into(),
        }
    }
}

/// Receives change events.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: ChangeEvent);
}

/// Logs events at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn notify(&self, event: ChangeEvent) {
        tracing::debug!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            new_state = %event.new_state,
            "change event"
        );
    }
}

/// Fans events out to in-process subscribers over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events for one entity.
    pub fn subscribe(&self, entity_type: EntityType, entity_id: &str) -> EntitySubscription {
        EntitySubscription {
            receiver: self.sender.subscribe(),
            entity_type,
            entity_id: entity_id.to_string(),
        }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventNotifier for BroadcastNotifier {
    fn notify(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

/// Receiver filtered to one entity.
#[derive(Debug)]
pub struct EntitySubscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    entity_type: EntityType,
    entity_id: String,
}

impl EntitySubscription {
    /// Next event for this entity, or `None` once the notifier is gone.
    /// Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event)
                    if event.entity_type == self.entity_type
                        && event.entity_id == self.entity_id =>
                {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagged behind change events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_filters_by_entity() {
        let notifier = BroadcastNotifier::default();
        let mut sub = notifier.subscribe(EntityType::Submission, "s2");

        notifier.notify(ChangeEvent::new(EntityType::Submission, "s1", "graded"));
        notifier.notify(ChangeEvent::new(EntityType::Assignment, "s2", "updated"));
        notifier.notify(ChangeEvent::new(EntityType::Submission, "s2", "ai_reviewed"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.entity_id, "s2");
        assert_eq!(event.new_state, "ai_reviewed");
    }

    #[test]
    fn notify_without_subscribers_is_fine() {
        BroadcastNotifier::new(4).notify(ChangeEvent::new(EntityType::Assignment, "a1", "created"));
    }
}
