//! # Change Notifications
//!
//! Broadcast fan-out of data-change events to connected WebSocket clients.
//! Publishing never blocks and never fails; with no subscribers the event is
//! dropped. A subscriber that falls behind receives `RecvError::Lagged` and
//! should refetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

/// Entities clients can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Leaves,
    Personnel,
    LeaveTypes,
    Users,
    Holidays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Import,
}

/// Payload sent to clients: `{"type": "data_change", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub entity: Entity,
    pub action: ChangeAction,
    pub username: String,
    pub entity_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast-based notifier, one per application.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. If there are no subscribers the event is dropped silently.
    pub fn notify_change(
        &self,
        entity: Entity,
        action: ChangeAction,
        username: &str,
        entity_id: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        let event = ChangeEvent {
            kind: "data_change".to_string(),
            entity,
            action,
            username: username.to_string(),
            entity_id,
            details,
            timestamp: Utc::now(),
        };
        tracing::debug!(entity = ?entity, action = ?action, "broadcasting change");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.notify_change(
            Entity::Leaves,
            ChangeAction::Create,
            "admin",
            Some("abc".into()),
            None,
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.entity, Entity::Leaves);
        assert_eq!(event.action, ChangeAction::Create);
        assert_eq!(event.entity_id.as_deref(), Some("abc"));
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let notifier = Notifier::new(4);
        notifier.notify_change(Entity::Users, ChangeAction::Delete, "root", None, None);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber() {
        let notifier = Notifier::new(2);
        let mut rx = notifier.subscribe();
        for _ in 0..5 {
            notifier.notify_change(Entity::Personnel, ChangeAction::Update, "a", None, None);
        }
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("Expected Lagged, got {other:?}"),
        }
    }

    #[test]
    fn event_wire_shape() {
        let event = ChangeEvent {
            kind: "data_change".into(),
            entity: Entity::LeaveTypes,
            action: ChangeAction::Import,
            username: "admin".into(),
            entity_id: None,
            details: Some(serde_json::json!({"added": 2})),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "data_change");
        assert_eq!(json["entity"], "leave_types");
        assert_eq!(json["action"], "import");
        assert_eq!(json["details"]["added"], 2);
    }
}
