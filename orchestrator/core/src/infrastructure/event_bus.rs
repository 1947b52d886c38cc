// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus - Pub/Sub for Registry Events
//
// In-memory fan-out over a tokio broadcast channel. Events are lost on
// restart; the registry document is the durable record.

use crate::domain::agent::AgentId;
use crate::domain::events::RegistryEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to registry events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<RegistryEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered events before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: RegistryEvent) {
        debug!(kind = event.kind(), "Publishing registry event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Only events that concern `agent_id`.
    pub fn subscribe_agent(&self, agent_id: AgentId) -> AgentEventReceiver {
        AgentEventReceiver {
            receiver: self.sender.subscribe(),
            agent_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<RegistryEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<RegistryEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<RegistryEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

pub struct AgentEventReceiver {
    receiver: broadcast::Receiver<RegistryEvent>,
    agent_id: AgentId,
}

impl AgentEventReceiver {
    pub async fn recv(&mut self) -> Result<RegistryEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.agent_ids().contains(&&self.agent_id) {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::Specialization;
    use chrono::Utc;

    fn promoted(id: &str) -> RegistryEvent {
        RegistryEvent::AgentPromoted {
            agent_id: AgentId::from(id),
            specialization: Specialization::Security,
            overall: 0.9,
            reason: "sustained high performance".to_string(),
            promoted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        bus.publish(promoted("security-1"));

        match receiver.recv().await.unwrap() {
            RegistryEvent::AgentPromoted { agent_id, .. } => assert_eq!(agent_id.as_str(), "security-1"),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agent_filtering() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe_agent(AgentId::from("security-2"));
        bus.publish(promoted("security-1"));
        bus.publish(promoted("security-2"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.agent_ids(), vec![&AgentId::from("security-2")]);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(promoted("a"));
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(matches!(first.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(promoted("a")).unwrap();
        assert_eq!(json["type"], "agent_promoted");
    }
}
