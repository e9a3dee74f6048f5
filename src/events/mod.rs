//! Template change events.
//!
//! On every effective registration the service publishes a
//! [`TemplateChangeEvent`] carrying the previous/new state classification
//! and the acting principal, for audit and observability consumers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::template::TemplateState;
use crate::metrics::TEMPLATE_CHANGE_EVENTS_TOTAL;
use crate::security::Principal;

/// Classification of a template change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Created,
    Updated,
}

/// What changed about a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChange {
    pub change_type: ChangeType,
    pub template_name: String,
    pub template_id: String,
    pub state: TemplateState,
}

/// A published change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateChangeEvent {
    pub change: TemplateChange,
    pub timestamp: DateTime<Utc>,
    /// The acting principal, captured from the explicit request context
    pub principal: Option<Principal>,
}

impl TemplateChangeEvent {
    pub fn new(change: TemplateChange, principal: Option<Principal>) -> Self {
        Self {
            change,
            timestamp: Utc::now(),
            principal,
        }
    }
}

/// Publishes template change events to downstream consumers.
#[async_trait]
pub trait TemplateEventBus: Send + Sync {
    async fn notify(&self, event: TemplateChangeEvent);
}

/// Event bus over a `tokio` broadcast channel.
///
/// Publishing when no subscriber exists is a no-op; consumers subscribe
/// before the operations whose events they care about.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<TemplateChangeEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TemplateChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl TemplateEventBus for BroadcastEventBus {
    async fn notify(&self, event: TemplateChangeEvent) {
        TEMPLATE_CHANGE_EVENTS_TOTAL.inc();
        tracing::debug!(
            template_id = %event.change.template_id,
            template_name = %event.change.template_name,
            change_type = ?event.change.change_type,
            "Publishing template change event"
        );
        // send only fails when there is no receiver, which is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, change_type: ChangeType) -> TemplateChangeEvent {
        TemplateChangeEvent::new(
            TemplateChange {
                change_type,
                template_name: name.to_string(),
                template_id: "t-1".to_string(),
                state: TemplateState::Enabled,
            },
            Some(Principal::new("dana")),
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.notify(event("ingest", ChangeType::Created)).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.change.template_name, "ingest");
        assert_eq!(received.change.change_type, ChangeType::Created);
        assert_eq!(received.principal.as_ref().map(|p| p.name.as_str()), Some("dana"));
    }

    #[tokio::test]
    async fn test_notify_without_subscriber_is_noop() {
        let bus = BroadcastEventBus::new(8);
        bus.notify(event("ingest", ChangeType::Updated)).await;
    }

    #[test]
    fn test_event_json_shape() {
        let value = serde_json::to_value(event("ingest", ChangeType::Created)).unwrap();
        assert_eq!(value["change"]["change_type"], "CREATED");
        assert_eq!(value["change"]["template_name"], "ingest");
        assert_eq!(value["principal"]["name"], "dana");
    }
}
