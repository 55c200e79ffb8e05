use crate::constants::defaults;
use serde_json::Value;
use tokio::sync::broadcast;

/// Lifecycle event publisher backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub execution_id: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event for an execution
    pub fn publish(
        &self,
        event_name: impl Into<String>,
        execution_id: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        let name = event_name.into();
        if name.trim().is_empty() {
            return Err(PublishError::EmptyEventName);
        }

        let event = PublishedEvent {
            name,
            execution_id: execution_id.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // No subscribers is not an error
        match self.sender.send(event) {
            Ok(_) | Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event name must not be empty")]
    EmptyEventName,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        publisher
            .publish("step.completed", "exec-1", json!({"step_index": 0}))
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, "step.completed");
        assert_eq!(event.execution_id, "exec-1");
        assert_eq!(event.context["step_index"], json!(0));
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::default();
        assert!(publisher.publish("execution.started", "exec-1", json!({})).is_ok());
    }

    #[test]
    fn test_blank_event_name_is_rejected() {
        let publisher = EventPublisher::default();
        assert!(matches!(
            publisher.publish(" ", "exec-1", json!({})),
            Err(PublishError::EmptyEventName)
        ));
    }
}
