// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Provisioning Events
//
// In-memory broadcast of pipeline, monitor and template events for log
// tailing, tests and future streaming endpoints. Events are not persisted;
// the status store and the monitor store are the durable state.

use crate::domain::events::{MonitorEvent, PipelineEvent, TemplateEvent};
use crate::domain::job::ListItemId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Pipeline(PipelineEvent),
    Monitor(MonitorEvent),
    Template(TemplateEvent),
}

/// Event bus for publishing and subscribing to provisioning events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_pipeline_event(&self, event: PipelineEvent) {
        self.publish(DomainEvent::Pipeline(event));
    }

    pub fn publish_monitor_event(&self, event: MonitorEvent) {
        self.publish(DomainEvent::Monitor(event));
    }

    pub fn publish_template_event(&self, event: TemplateEvent) {
        self.publish(DomainEvent::Template(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is listening
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to template events of a single job.
    pub fn subscribe_job(&self, list_item_id: ListItemId) -> JobEventReceiver {
        JobEventReceiver {
            receiver: self.sender.subscribe(),
            list_item_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
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

/// Receiver filtered to one job's template events
pub struct JobEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    list_item_id: ListItemId,
}

impl JobEventReceiver {
    pub async fn recv(&mut self) -> Result<TemplateEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Template(template_event) = event {
                if template_event.list_item_id() == Some(self.list_item_id) {
                    return Ok(template_event);
                }
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

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
