//! Event emission: the `EventSender` seam, the broker-backed HTTP sender
//! and an in-memory bus for tests and dev.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::cloudevent::{CloudEvent, CONTENT_TYPE_CLOUDEVENTS};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to reach event bus: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("event bus rejected event with status {0}")]
    Rejected(u16),
}

/// Emits internal events onto the bus. Implementations must tolerate
/// duplicate emission of the same event id (deterministic ids make retried
/// emits identical).
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send(&self, event: CloudEvent) -> Result<(), SendError>;
}

#[async_trait]
impl<S> EventSender for Arc<S>
where
    S: EventSender + ?Sized,
{
    async fn send(&self, event: CloudEvent) -> Result<(), SendError> {
        (**self).send(event).await
    }
}

/// Sender POSTing structured-mode CloudEvents to the broker ingress.
#[derive(Debug, Clone)]
pub struct HttpEventSender {
    client: reqwest::Client,
    address: String,
}

impl HttpEventSender {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            address: address.into(),
        }
    }
}

#[async_trait]
impl EventSender for HttpEventSender {
    async fn send(&self, event: CloudEvent) -> Result<(), SendError> {
        let body = serde_json::to_vec(&event)?;
        let response = self
            .client
            .post(&self.address)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_CLOUDEVENTS)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.ty,
                status = status.as_u16(),
                "event bus rejected event"
            );
            return Err(SendError::Rejected(status.as_u16()));
        }
        tracing::debug!(event_id = %event.id, event_type = %event.ty, "event emitted");
        Ok(())
    }
}

/// In-memory bus for tests/dev.
///
/// - No IO
/// - Records every sent event for assertions
/// - Fans out to subscribers; at-least-once acceptable (consumers must be
///   idempotent)
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    sent: Mutex<Vec<CloudEvent>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CloudEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<CloudEvent> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain the sent log, returning what was there.
    pub fn take_sent(&self) -> Vec<CloudEvent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CloudEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

#[async_trait]
impl EventSender for InMemoryEventBus {
    async fn send(&self, event: CloudEvent) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(event.clone());

        // Drop dead subscribers while publishing.
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{EventType, Source};

    fn event(id: &str) -> CloudEvent {
        CloudEvent::without_data(id, EventType::NotificationSent, Source::Notify)
    }

    #[tokio::test]
    async fn in_memory_bus_records_and_forwards() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe();

        bus.send(event("e1")).await.unwrap();
        bus.send(event("e2")).await.unwrap();

        assert_eq!(bus.sent().len(), 2);
        assert_eq!(rx.recv().await.unwrap().id, "e1");
        assert_eq!(rx.recv().await.unwrap().id, "e2");

        assert_eq!(bus.take_sent().len(), 2);
        assert!(bus.sent().is_empty());
    }

    #[tokio::test]
    async fn dropped_subscribers_do_not_fail_publish() {
        let bus = InMemoryEventBus::new();
        drop(bus.subscribe());
        bus.send(event("e1")).await.unwrap();
        assert_eq!(bus.sent().len(), 1);
    }
}
